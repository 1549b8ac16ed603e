use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::TryStreamExt;

use crate::{Item, ItemKey, ItemQuery, Result, ScanFilter, StoreError};

/// Whether a put may overwrite an existing item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PutCondition {
    /// Insert or replace.
    #[default]
    Always,
    /// Fail with [`StoreError::ConditionFailed`] if a live item has the key.
    IfAbsent,
}

/// A stream of items.
pub type ItemStream = Pin<Box<dyn Stream<Item = Result<Item>> + Send>>;

/// Client for a store addressing items by partition key and sort key.
///
/// Tables are created implicitly on first write. All implementations must be
/// thread-safe (Send + Sync) and must hide expired items from every read.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Writes an item, replacing any item with the same key unless
    /// `condition` forbids it.
    async fn put(&self, table: &str, item: Item, condition: PutCondition) -> Result<()>;

    /// Reads the item stored under `key`.
    async fn get(&self, table: &str, key: &ItemKey) -> Result<Option<Item>>;

    /// Reads items of one partition, ordered by sort key.
    async fn query(&self, table: &str, query: ItemQuery) -> Result<Vec<Item>>;

    /// Removes the item stored under `key`.
    ///
    /// Returns whether a live item was removed.
    async fn delete(&self, table: &str, key: &ItemKey) -> Result<bool>;

    /// Streams every item of a table matching the filter, ordered by
    /// partition key then sort key.
    async fn scan(&self, table: &str, filter: ScanFilter) -> Result<ItemStream>;
}

/// Extension trait providing convenience methods for key-value stores.
#[async_trait]
pub trait KeyValueStoreExt: KeyValueStore {
    /// Reads every item of a partition.
    async fn query_partition(&self, table: &str, partition_key: &str) -> Result<Vec<Item>> {
        self.query(table, ItemQuery::partition(partition_key)).await
    }

    /// Collects a scan into memory.
    async fn scan_all(&self, table: &str, filter: ScanFilter) -> Result<Vec<Item>> {
        self.scan(table, filter).await?.try_collect().await
    }

    /// Checks if a live item is stored under `key`.
    async fn exists(&self, table: &str, key: &ItemKey) -> Result<bool> {
        Ok(self.get(table, key).await?.is_some())
    }
}

// Blanket implementation for all KeyValueStore implementations
impl<T: KeyValueStore + ?Sized> KeyValueStoreExt for T {}

/// Validates a table name and item key before writing.
///
/// Partition keys must be non-empty. A present sort key must be non-empty
/// too, so that "no sort key" stays distinguishable in backends that store
/// it as an empty string.
pub fn validate_item_key(table: &str, key: &ItemKey) -> Result<()> {
    if table.is_empty() {
        return Err(StoreError::InvalidItem("table name is empty".to_string()));
    }
    if key.partition_key.is_empty() {
        return Err(StoreError::InvalidItem(format!(
            "empty partition key in table {table}"
        )));
    }
    if key.sort_key.as_deref() == Some("") {
        return Err(StoreError::InvalidItem(format!(
            "empty sort key for partition {} in table {table}",
            key.partition_key
        )));
    }
    Ok(())
}
