//! Key-value store client addressing items by partition key and sort key.
//!
//! - [`KeyValueStore`] trait with put / get / query / delete / scan
//! - [`InMemoryKeyValueStore`] for tests and single-process use
//! - [`PostgresKeyValueStore`] backed by a single `kv_items` table
//! - `DynamoKeyValueStore` behind the `dynamo` feature

#[cfg(feature = "dynamo")]
pub mod dynamo;
pub mod error;
pub mod item;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

#[cfg(feature = "dynamo")]
pub use dynamo::DynamoKeyValueStore;
pub use error::{Result, StoreError};
pub use item::{Item, ItemKey};
pub use memory::InMemoryKeyValueStore;
pub use postgres::PostgresKeyValueStore;
pub use query::{ItemQuery, ScanFilter, SortKeyCondition};
pub use store::{ItemStream, KeyValueStore, KeyValueStoreExt, PutCondition};
