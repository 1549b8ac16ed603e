use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    Item, ItemKey, ItemQuery, Result, ScanFilter, StoreError,
    store::{ItemStream, KeyValueStore, PutCondition, validate_item_key},
};

type Table = BTreeMap<ItemKey, Item>;

/// In-memory key-value store implementation for testing.
///
/// This implementation keeps every table in ordered maps and provides the
/// same interface as the PostgreSQL and DynamoDB implementations. Clones
/// share the same data.
#[derive(Clone, Default)]
pub struct InMemoryKeyValueStore {
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl InMemoryKeyValueStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live items in a table.
    pub async fn item_count(&self, table: &str) -> usize {
        let now = Utc::now();
        let tables = self.tables.read().await;
        tables
            .get(table)
            .map(|items| items.values().filter(|item| item.is_live_at(now)).count())
            .unwrap_or(0)
    }

    /// Returns the names of all tables written so far.
    pub async fn table_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tables.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Clears all tables.
    pub async fn clear(&self) {
        self.tables.write().await.clear();
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn put(&self, table: &str, item: Item, condition: PutCondition) -> Result<()> {
        validate_item_key(table, &item.key)?;

        let now = Utc::now();
        let mut tables = self.tables.write().await;
        let items = tables.entry(table.to_string()).or_default();

        if condition == PutCondition::IfAbsent
            && items
                .get(&item.key)
                .is_some_and(|existing| existing.is_live_at(now))
        {
            tracing::debug!(table = %table, key = %item.key, "conditional put found a live item");
            return Err(StoreError::ConditionFailed {
                table: table.to_string(),
                key: item.key,
            });
        }

        items.insert(item.key.clone(), item);
        Ok(())
    }

    async fn get(&self, table: &str, key: &ItemKey) -> Result<Option<Item>> {
        let now = Utc::now();
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .and_then(|items| items.get(key))
            .filter(|item| item.is_live_at(now))
            .cloned())
    }

    async fn query(&self, table: &str, query: ItemQuery) -> Result<Vec<Item>> {
        let now = Utc::now();
        let tables = self.tables.read().await;
        let Some(items) = tables.get(table) else {
            return Ok(Vec::new());
        };

        // A partition-only key sorts before every composite key of the same
        // partition, so this range starts at the first item of the partition.
        let mut matching: Vec<Item> = items
            .range(ItemKey::new(query.partition_key.as_str())..)
            .take_while(|(key, _)| key.partition_key == query.partition_key)
            .map(|(_, item)| item)
            .filter(|item| item.is_live_at(now) && query.condition.matches(item.key.sort_key()))
            .cloned()
            .collect();

        if query.descending {
            matching.reverse();
        }
        if let Some(limit) = query.limit {
            matching.truncate(limit);
        }

        Ok(matching)
    }

    async fn delete(&self, table: &str, key: &ItemKey) -> Result<bool> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        let removed = tables.get_mut(table).and_then(|items| items.remove(key));
        Ok(removed.is_some_and(|item| item.is_live_at(now)))
    }

    async fn scan(&self, table: &str, filter: ScanFilter) -> Result<ItemStream> {
        use futures_util::stream;

        let now = Utc::now();
        let tables = self.tables.read().await;
        let items: Vec<Item> = tables
            .get(table)
            .map(|items| {
                items
                    .values()
                    .filter(|item| item.is_live_at(now) && filter.matches(&item.key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let stream = stream::iter(items.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }
}
