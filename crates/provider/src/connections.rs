//! Per-connection data for clients holding a persistent connection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::keys::validate_key_component;
use kv_store::{Item, ItemKey, KeyValueStore, PutCondition};
use serde::{Deserialize, Serialize};

use crate::{Result, TableNames};

/// Data kept for an open connection until it expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDataEnvelope {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expiration_time: DateTime<Utc>,

    /// The authenticated user, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
}

/// Stores connection data keyed by connection id alone.
pub struct ConnectionsAdapter<S: KeyValueStore> {
    store: Arc<S>,
    tables: Arc<TableNames>,
}

impl<S: KeyValueStore> Clone for ConnectionsAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            tables: self.tables.clone(),
        }
    }
}

impl<S: KeyValueStore> ConnectionsAdapter<S> {
    pub fn new(store: Arc<S>, tables: Arc<TableNames>) -> Self {
        Self { store, tables }
    }

    #[tracing::instrument(skip(self, data))]
    pub async fn store_data(&self, connection_id: &str, data: &ConnectionDataEnvelope) -> Result<()> {
        validate_key_component("connection_id", connection_id)?;

        let item = Item::from_value(ItemKey::new(connection_id), data)?.expires_at(data.expiration_time);
        self.store
            .put(&self.tables.connections, item, PutCondition::Always)
            .await?;

        tracing::debug!("connection data stored");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn fetch_data(&self, connection_id: &str) -> Result<Option<ConnectionDataEnvelope>> {
        validate_key_component("connection_id", connection_id)?;

        let item = self
            .store
            .get(&self.tables.connections, &ItemKey::new(connection_id))
            .await?;

        Ok(item.map(Item::into_value::<ConnectionDataEnvelope>).transpose()?)
    }

    /// Returns whether data was stored for the connection.
    #[tracing::instrument(skip(self))]
    pub async fn delete_data(&self, connection_id: &str) -> Result<bool> {
        validate_key_component("connection_id", connection_id)?;

        let removed = self
            .store
            .delete(&self.tables.connections, &ItemKey::new(connection_id))
            .await?;

        tracing::debug!(removed, "connection data deleted");
        Ok(removed)
    }
}
