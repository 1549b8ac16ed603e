//! Read model documents, one table per read model.

use std::sync::Arc;

use kv_store::{Item, ItemKey, KeyValueStore, KeyValueStoreExt, PutCondition, ScanFilter};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::search::{Filter, matches_all};
use crate::{ProviderError, Result, TableNames};

/// A read model document together with the read model it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadModelEnvelope {
    pub type_name: String,
    pub value: Value,
}

/// Stores, fetches and searches read model documents.
///
/// Each document is keyed by its string `id` property.
pub struct ReadModelsAdapter<S: KeyValueStore> {
    store: Arc<S>,
    tables: Arc<TableNames>,
}

impl<S: KeyValueStore> Clone for ReadModelsAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            tables: self.tables.clone(),
        }
    }
}

impl<S: KeyValueStore> ReadModelsAdapter<S> {
    pub fn new(store: Arc<S>, tables: Arc<TableNames>) -> Self {
        Self { store, tables }
    }

    /// Wraps raw stored items of a read model table into envelopes.
    pub fn raw_to_envelopes(read_model_name: &str, items: Vec<Item>) -> Vec<ReadModelEnvelope> {
        items
            .into_iter()
            .map(|item| ReadModelEnvelope {
                type_name: read_model_name.to_string(),
                value: item.attributes,
            })
            .collect()
    }

    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, read_model_name: &str, id: &str) -> Result<Option<Value>> {
        let item = self
            .store
            .get(&self.tables.read_model(read_model_name), &ItemKey::new(id))
            .await?;
        Ok(item.map(|item| item.attributes))
    }

    /// Inserts or replaces a read model document.
    #[tracing::instrument(skip(self, value))]
    pub async fn store(&self, read_model_name: &str, value: &Value) -> Result<()> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProviderError::MissingReadModelId {
                read_model: read_model_name.to_string(),
            })?;

        let item = Item::new(ItemKey::new(id), value.clone());
        self.store
            .put(
                &self.tables.read_model(read_model_name),
                item,
                PutCondition::Always,
            )
            .await?;

        metrics::counter!("provider_read_models_stored").increment(1);
        tracing::debug!(id, "read model stored");
        Ok(())
    }

    /// Documents matching every filter. No filters returns everything.
    #[tracing::instrument(skip(self, filters), fields(filters = filters.len()))]
    pub async fn search(&self, read_model_name: &str, filters: &[Filter]) -> Result<Vec<Value>> {
        for filter in filters {
            filter.validate()?;
        }

        let items = self
            .store
            .scan_all(&self.tables.read_model(read_model_name), ScanFilter::all())
            .await?;

        let results: Vec<Value> = items
            .into_iter()
            .map(|item| item.attributes)
            .filter(|document| matches_all(filters, document))
            .collect();

        tracing::debug!(results = results.len(), "read model search complete");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use kv_store::InMemoryKeyValueStore;
    use serde_json::json;

    use super::*;
    use crate::search::FilterOperation;

    fn adapter() -> ReadModelsAdapter<InMemoryKeyValueStore> {
        ReadModelsAdapter::new(
            Arc::new(InMemoryKeyValueStore::new()),
            Arc::new(TableNames::new("test", "unit")),
        )
    }

    #[tokio::test]
    async fn store_and_fetch() {
        let read_models = adapter();
        let cart = json!({"id": "abc123", "total": 3});

        read_models.store("CartReadModel", &cart).await.unwrap();

        let fetched = read_models.fetch("CartReadModel", "abc123").await.unwrap();
        assert_eq!(fetched, Some(cart));
        assert!(read_models
            .fetch("OtherReadModel", "abc123")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn store_replaces_existing_document() {
        let read_models = adapter();
        read_models
            .store("CartReadModel", &json!({"id": "abc123", "total": 3}))
            .await
            .unwrap();
        read_models
            .store("CartReadModel", &json!({"id": "abc123", "total": 4}))
            .await
            .unwrap();

        let fetched = read_models
            .fetch("CartReadModel", "abc123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched["total"], 4);
    }

    #[tokio::test]
    async fn store_requires_string_id() {
        let read_models = adapter();

        for value in [json!({"total": 3}), json!({"id": 7}), json!({"id": ""})] {
            let result = read_models.store("CartReadModel", &value).await;
            assert!(matches!(
                result,
                Err(ProviderError::MissingReadModelId { .. })
            ));
        }
    }

    #[tokio::test]
    async fn search_applies_all_filters() {
        let read_models = adapter();
        for (id, total, paid) in [("a", 10, true), ("b", 20, false), ("c", 30, true)] {
            read_models
                .store(
                    "CartReadModel",
                    &json!({"id": id, "total": total, "paid": paid}),
                )
                .await
                .unwrap();
        }

        let everything = read_models.search("CartReadModel", &[]).await.unwrap();
        assert_eq!(everything.len(), 3);

        let filters = vec![
            Filter::single("paid", FilterOperation::Eq, json!(true)),
            Filter::single("total", FilterOperation::Gt, json!(15)),
        ];
        let found = read_models.search("CartReadModel", &filters).await.unwrap();
        assert_eq!(found, vec![json!({"id": "c", "total": 30, "paid": true})]);
    }

    #[tokio::test]
    async fn search_rejects_invalid_filters() {
        let read_models = adapter();
        let filters = vec![Filter::new("total", FilterOperation::Between, vec![json!(1)])];

        let result = read_models.search("CartReadModel", &filters).await;
        assert!(matches!(result, Err(ProviderError::InvalidFilter(_))));
    }

    #[test]
    fn raw_items_wrap_into_envelopes() {
        let items = vec![Item::new(ItemKey::new("a"), json!({"id": "a"}))];
        let envelopes =
            ReadModelsAdapter::<InMemoryKeyValueStore>::raw_to_envelopes("CartReadModel", items);
        assert_eq!(
            envelopes,
            vec![ReadModelEnvelope {
                type_name: "CartReadModel".to_string(),
                value: json!({"id": "a"}),
            }]
        );
    }
}
