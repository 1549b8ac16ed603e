//! Event and snapshot storage addressed by entity partition keys.

use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use common::keys::{partition_key_for_index_by_entity, try_partition_key_for_event};
use common::{EntityId, EnvelopeKind};
use kv_store::{Item, ItemKey, ItemQuery, KeyValueStore, PutCondition};

use crate::{EventEnvelope, ProviderError, Result, TableNames};

/// Renders a timestamp as an event sort key.
///
/// Fixed-width RFC 3339 in UTC, so byte order is chronological order.
pub fn sort_key_for_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Next store timestamp, strictly after `previous` at sort-key precision.
fn next_store_timestamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(6);
    match previous.map(|previous| previous.trunc_subsecs(6)) {
        Some(previous) if now <= previous => previous + Duration::microseconds(1),
        _ => now,
    }
}

/// Reads and writes entity events and snapshots.
///
/// Envelopes of one entity and kind share the partition key
/// `{entity_type_name}-{entity_id}-{kind}` and are sorted by the time they
/// were stored. Every stored entity is also recorded in an index partition
/// `{entity_type_name}-{kind}`.
pub struct EventsAdapter<S: KeyValueStore> {
    store: Arc<S>,
    tables: Arc<TableNames>,
}

impl<S: KeyValueStore> Clone for EventsAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            tables: self.tables.clone(),
        }
    }
}

impl<S: KeyValueStore> EventsAdapter<S> {
    pub fn new(store: Arc<S>, tables: Arc<TableNames>) -> Self {
        Self { store, tables }
    }

    /// Decodes raw stored items (for example, change-stream records) into
    /// envelopes.
    pub fn raw_to_envelopes(items: Vec<Item>) -> Result<Vec<EventEnvelope>> {
        items
            .into_iter()
            .map(|item| item.into_value().map_err(ProviderError::from))
            .collect()
    }

    /// Stores envelopes in order.
    ///
    /// All envelopes are validated before the first write. Each one is
    /// written with a fresh store timestamp as its sort key and never
    /// overwrites an existing envelope.
    #[tracing::instrument(skip(self, envelopes), fields(count = envelopes.len()))]
    pub async fn store(&self, envelopes: &[EventEnvelope]) -> Result<()> {
        let partition_keys = envelopes
            .iter()
            .map(|envelope| {
                if envelope.type_name.is_empty() {
                    return Err(ProviderError::InvalidEnvelope(format!(
                        "envelope for entity {} has no type name",
                        envelope.entity_id
                    )));
                }
                Ok(try_partition_key_for_event(
                    &envelope.entity_type_name,
                    envelope.entity_id.as_str(),
                    envelope.kind,
                )?)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut last_stamp = None;
        for (envelope, partition_key) in envelopes.iter().zip(partition_keys) {
            let stamp = next_store_timestamp(last_stamp);
            last_stamp = Some(stamp);

            let key = ItemKey::with_sort_key(partition_key, sort_key_for_timestamp(stamp));
            let item = Item::from_value(key, envelope)?;
            self.store
                .put(&self.tables.events, item, PutCondition::IfAbsent)
                .await?;

            let index_key = ItemKey::with_sort_key(
                partition_key_for_index_by_entity(&envelope.entity_type_name, envelope.kind),
                envelope.entity_id.as_str(),
            );
            let index_item = Item::new(
                index_key,
                serde_json::json!({
                    "entityTypeName": envelope.entity_type_name,
                    "entityID": envelope.entity_id,
                    "kind": envelope.kind,
                }),
            );
            self.store
                .put(&self.tables.events_index, index_item, PutCondition::Always)
                .await?;

            metrics::counter!("provider_events_stored", "kind" => envelope.kind.as_str())
                .increment(1);
        }

        tracing::debug!("events stored");
        Ok(())
    }

    /// Events of an entity stored strictly after `since`, oldest first.
    ///
    /// Without `since`, returns the whole stream.
    #[tracing::instrument(skip(self))]
    pub async fn for_entity_since(
        &self,
        entity_type_name: &str,
        entity_id: &EntityId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventEnvelope>> {
        let partition_key =
            try_partition_key_for_event(entity_type_name, entity_id.as_str(), EnvelopeKind::Event)?;
        let since = since.unwrap_or(DateTime::UNIX_EPOCH);

        let items = self
            .store
            .query(
                &self.tables.events,
                ItemQuery::partition(partition_key).after(sort_key_for_timestamp(since)),
            )
            .await?;

        Self::raw_to_envelopes(items)
    }

    /// The most recently stored snapshot of an entity.
    #[tracing::instrument(skip(self))]
    pub async fn latest_entity_snapshot(
        &self,
        entity_type_name: &str,
        entity_id: &EntityId,
    ) -> Result<Option<EventEnvelope>> {
        let partition_key = try_partition_key_for_event(
            entity_type_name,
            entity_id.as_str(),
            EnvelopeKind::Snapshot,
        )?;

        let items = self
            .store
            .query(
                &self.tables.events,
                ItemQuery::partition(partition_key).descending().limit(1),
            )
            .await?;

        match items.into_iter().next() {
            Some(item) => {
                tracing::debug!("snapshot found");
                Ok(Some(item.into_value()?))
            }
            None => {
                tracing::debug!("no snapshot found");
                Ok(None)
            }
        }
    }

    /// Ids of every entity of a type that has envelopes of `kind`.
    #[tracing::instrument(skip(self))]
    pub async fn entity_ids(
        &self,
        entity_type_name: &str,
        kind: EnvelopeKind,
    ) -> Result<Vec<EntityId>> {
        let partition_key =
            common::keys::try_partition_key_for_index_by_entity(entity_type_name, kind)?;

        let items = self
            .store
            .query(&self.tables.events_index, ItemQuery::partition(partition_key))
            .await?;

        Ok(items
            .into_iter()
            .filter_map(|item| item.key.sort_key.map(EntityId::from))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use common::KeyError;
    use kv_store::{InMemoryKeyValueStore, KeyValueStoreExt};

    use super::*;

    fn adapter() -> (EventsAdapter<InMemoryKeyValueStore>, InMemoryKeyValueStore) {
        let store = InMemoryKeyValueStore::new();
        let tables = Arc::new(TableNames::new("test", "unit"));
        (EventsAdapter::new(Arc::new(store.clone()), tables), store)
    }

    fn create_test_event(entity_id: &str, type_name: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .request_id("req")
            .type_name(type_name)
            .entity_type_name("Cart")
            .entity_id(entity_id)
            .value_raw(serde_json::json!({"type": type_name}))
            .build()
    }

    fn create_test_snapshot(entity_id: &str, total: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .type_name("Cart")
            .entity_type_name("Cart")
            .entity_id(entity_id)
            .kind(EnvelopeKind::Snapshot)
            .value_raw(serde_json::json!({"total": total}))
            .build()
    }

    #[test]
    fn sort_keys_are_fixed_width_utc() {
        assert_eq!(
            sort_key_for_timestamp(DateTime::UNIX_EPOCH),
            "1970-01-01T00:00:00.000000Z"
        );
    }

    #[test]
    fn store_timestamps_strictly_increase() {
        let far_future = (Utc::now() + Duration::days(1)).trunc_subsecs(6);
        let next = next_store_timestamp(Some(far_future));
        assert_eq!(next, far_future + Duration::microseconds(1));
        assert!(sort_key_for_timestamp(next) > sort_key_for_timestamp(far_future));
    }

    #[test]
    fn store_timestamps_advance_within_the_same_microsecond() {
        for _ in 0..10_000 {
            let previous = Utc::now() - Duration::nanoseconds(1);
            let next = next_store_timestamp(Some(previous));
            assert!(
                sort_key_for_timestamp(next) > sort_key_for_timestamp(previous),
                "{next} does not sort after {previous}"
            );
        }
    }

    #[test]
    fn store_timestamps_have_sort_key_precision() {
        let stamp = next_store_timestamp(None);
        assert_eq!(stamp, stamp.trunc_subsecs(6));
    }

    #[tokio::test]
    async fn store_writes_under_event_partition_key() {
        let (events, store) = adapter();

        events
            .store(&[create_test_event("abc123", "CartCreated")])
            .await
            .unwrap();

        let items = store
            .query_partition("test-unit-events-store", "Cart-abc123-event")
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].attributes["typeName"], "CartCreated");
    }

    #[tokio::test]
    async fn store_batch_keeps_order() {
        let (events, _) = adapter();
        let batch: Vec<_> = (0..5)
            .map(|i| create_test_event("abc123", &format!("Event{i}")))
            .collect();

        events.store(&batch).await.unwrap();

        let stored = events
            .for_entity_since("Cart", &EntityId::from("abc123"), None)
            .await
            .unwrap();
        let names: Vec<_> = stored.iter().map(|e| e.type_name.as_str()).collect();
        assert_eq!(names, vec!["Event0", "Event1", "Event2", "Event3", "Event4"]);
    }

    #[tokio::test]
    async fn store_rejects_ambiguous_entity_type_before_writing() {
        let (events, store) = adapter();
        let mut bad = create_test_event("abc123", "CartCreated");
        bad.entity_type_name = "Shop-Cart".to_string();

        let result = events
            .store(&[create_test_event("abc123", "CartCreated"), bad])
            .await;

        assert!(matches!(
            result,
            Err(ProviderError::InvalidKey(KeyError::ContainsDelimiter { .. }))
        ));
        assert_eq!(store.item_count("test-unit-events-store").await, 0);
    }

    #[tokio::test]
    async fn store_rejects_missing_type_name() {
        let (events, _) = adapter();
        let mut bad = create_test_event("abc123", "CartCreated");
        bad.type_name.clear();

        let result = events.store(&[bad]).await;
        assert!(matches!(result, Err(ProviderError::InvalidEnvelope(_))));
    }

    #[tokio::test]
    async fn for_entity_since_skips_older_events_and_snapshots() {
        let (events, _) = adapter();
        let id = EntityId::from("abc123");

        events
            .store(&[create_test_event("abc123", "CartCreated")])
            .await
            .unwrap();
        let checkpoint = Utc::now();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        events
            .store(&[
                create_test_event("abc123", "ItemAdded"),
                create_test_snapshot("abc123", 1),
            ])
            .await
            .unwrap();

        let all = events.for_entity_since("Cart", &id, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let recent = events
            .for_entity_since("Cart", &id, Some(checkpoint))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].type_name, "ItemAdded");
    }

    #[tokio::test]
    async fn latest_snapshot_is_most_recently_stored() {
        let (events, _) = adapter();
        let id = EntityId::from("abc123");

        assert!(events
            .latest_entity_snapshot("Cart", &id)
            .await
            .unwrap()
            .is_none());

        events
            .store(&[create_test_snapshot("abc123", 1), create_test_snapshot("abc123", 2)])
            .await
            .unwrap();

        let latest = events
            .latest_entity_snapshot("Cart", &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.value["total"], 2);
        assert_eq!(latest.kind, EnvelopeKind::Snapshot);
    }

    #[tokio::test]
    async fn entity_ids_lists_each_entity_once() {
        let (events, _) = adapter();

        events
            .store(&[
                create_test_event("a", "CartCreated"),
                create_test_event("a", "ItemAdded"),
                create_test_event("b", "CartCreated"),
            ])
            .await
            .unwrap();

        let ids = events.entity_ids("Cart", EnvelopeKind::Event).await.unwrap();
        assert_eq!(ids, vec![EntityId::from("a"), EntityId::from("b")]);

        let snapshots = events
            .entity_ids("Cart", EnvelopeKind::Snapshot)
            .await
            .unwrap();
        assert!(snapshots.is_empty());
    }

    #[tokio::test]
    async fn raw_items_decode_to_envelopes() {
        let (events, store) = adapter();
        let envelope = create_test_event("abc123", "CartCreated");
        events.store(std::slice::from_ref(&envelope)).await.unwrap();

        let items = store
            .query_partition("test-unit-events-store", "Cart-abc123-event")
            .await
            .unwrap();
        let decoded = EventsAdapter::<InMemoryKeyValueStore>::raw_to_envelopes(items).unwrap();
        assert_eq!(decoded, vec![envelope]);
    }
}
