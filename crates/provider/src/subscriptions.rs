//! Live read model subscriptions held by client connections.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::keys::{subscription_sort_key_prefix, try_sort_key_for_subscription, validate_key_component};
use kv_store::{Item, ItemKey, KeyValueStore, KeyValueStoreExt, PutCondition, ScanFilter};
use serde::{Deserialize, Serialize};

use crate::{ProviderError, Result, TableNames};

/// One client's subscription to a read model over a persistent connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEnvelope {
    /// The read model subscribed to.
    pub type_name: String,

    #[serde(rename = "connectionID")]
    pub connection_id: String,

    #[serde(rename = "subscriptionID")]
    pub subscription_id: String,

    /// The subscribed operation (query and variables), kept opaque.
    pub operation: serde_json::Value,

    #[serde(rename = "requestID")]
    pub request_id: String,

    /// When the subscription stops being delivered, in epoch seconds on the wire.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expiration_time: DateTime<Utc>,
}

/// Stores subscriptions partitioned by read model.
///
/// The sort key `{connection_id}-{subscription_id}` lets all subscriptions of
/// a connection be found with one prefix scan, so connection ids must not
/// contain the key delimiter.
pub struct SubscriptionsAdapter<S: KeyValueStore> {
    store: Arc<S>,
    tables: Arc<TableNames>,
}

impl<S: KeyValueStore> Clone for SubscriptionsAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            tables: self.tables.clone(),
        }
    }
}

impl<S: KeyValueStore> SubscriptionsAdapter<S> {
    pub fn new(store: Arc<S>, tables: Arc<TableNames>) -> Self {
        Self { store, tables }
    }

    /// Registers (or renews) a subscription.
    #[tracing::instrument(
        skip(self, envelope),
        fields(
            read_model = %envelope.type_name,
            connection_id = %envelope.connection_id,
            subscription_id = %envelope.subscription_id
        )
    )]
    pub async fn subscribe(&self, envelope: &SubscriptionEnvelope) -> Result<()> {
        if envelope.type_name.is_empty() {
            return Err(ProviderError::InvalidEnvelope(
                "subscription has no read model type name".to_string(),
            ));
        }
        let sort_key = try_sort_key_for_subscription(&envelope.connection_id, &envelope.subscription_id)?;

        let item = Item::from_value(
            ItemKey::with_sort_key(envelope.type_name.as_str(), sort_key),
            envelope,
        )?
        .expires_at(envelope.expiration_time);

        self.store
            .put(&self.tables.subscriptions, item, PutCondition::Always)
            .await?;

        metrics::counter!("provider_subscriptions_created").increment(1);
        tracing::debug!("subscription stored");
        Ok(())
    }

    /// Live subscriptions to a read model.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_subscriptions(
        &self,
        read_model_name: &str,
    ) -> Result<Vec<SubscriptionEnvelope>> {
        let items = self
            .store
            .query_partition(&self.tables.subscriptions, read_model_name)
            .await?;

        items
            .into_iter()
            .map(|item| item.into_value().map_err(ProviderError::from))
            .collect()
    }

    /// Removes one subscription of a connection, whichever read model it is
    /// on. Returns how many records were removed.
    #[tracing::instrument(skip(self))]
    pub async fn delete_subscription(
        &self,
        connection_id: &str,
        subscription_id: &str,
    ) -> Result<usize> {
        let sort_key = try_sort_key_for_subscription(connection_id, subscription_id)?;

        let items = self
            .store
            .scan_all(
                &self.tables.subscriptions,
                ScanFilter::all().sort_key_prefix(sort_key.as_str()),
            )
            .await?;

        let matching = items
            .into_iter()
            .filter(|item| item.key.sort_key() == Some(sort_key.as_str()));
        let removed = self.delete_items(matching).await?;

        tracing::debug!(removed, "subscription deleted");
        Ok(removed)
    }

    /// Removes every subscription of a connection. Returns how many were
    /// removed.
    #[tracing::instrument(skip(self))]
    pub async fn delete_all_subscriptions(&self, connection_id: &str) -> Result<usize> {
        validate_key_component("connection_id", connection_id)?;

        let items = self
            .store
            .scan_all(
                &self.tables.subscriptions,
                ScanFilter::all().sort_key_prefix(subscription_sort_key_prefix(connection_id)),
            )
            .await?;

        let removed = self.delete_items(items.into_iter()).await?;

        tracing::debug!(removed, "connection subscriptions deleted");
        Ok(removed)
    }

    async fn delete_items(&self, items: impl Iterator<Item = Item> + Send) -> Result<usize> {
        let mut removed = 0;
        for item in items {
            if self.store.delete(&self.tables.subscriptions, &item.key).await? {
                removed += 1;
            }
        }
        metrics::counter!("provider_subscriptions_deleted").increment(removed as u64);
        Ok(removed)
    }
}
