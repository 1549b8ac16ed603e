use std::sync::Arc;

use kv_store::KeyValueStore;

use crate::{ConnectionsAdapter, EventsAdapter, ReadModelsAdapter, SubscriptionsAdapter, TableNames};

#[cfg(feature = "infrastructure")]
use crate::infrastructure::Infrastructure;

/// The full set of provider adapters over one store and one set of tables.
pub struct ProviderLibrary<S: KeyValueStore> {
    pub events: EventsAdapter<S>,
    pub read_models: ReadModelsAdapter<S>,
    pub subscriptions: SubscriptionsAdapter<S>,
    pub connections: ConnectionsAdapter<S>,
    store: Arc<S>,
    tables: Arc<TableNames>,
    #[cfg(feature = "infrastructure")]
    infrastructure: Option<Arc<dyn Infrastructure>>,
}

impl<S: KeyValueStore> Clone for ProviderLibrary<S> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
            read_models: self.read_models.clone(),
            subscriptions: self.subscriptions.clone(),
            connections: self.connections.clone(),
            store: self.store.clone(),
            tables: self.tables.clone(),
            #[cfg(feature = "infrastructure")]
            infrastructure: self.infrastructure.clone(),
        }
    }
}

impl<S: KeyValueStore> ProviderLibrary<S> {
    pub fn new(store: Arc<S>, tables: TableNames) -> Self {
        let tables = Arc::new(tables);
        Self {
            events: EventsAdapter::new(store.clone(), tables.clone()),
            read_models: ReadModelsAdapter::new(store.clone(), tables.clone()),
            subscriptions: SubscriptionsAdapter::new(store.clone(), tables.clone()),
            connections: ConnectionsAdapter::new(store.clone(), tables.clone()),
            store,
            tables,
            #[cfg(feature = "infrastructure")]
            infrastructure: None,
        }
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Attaches the storage preparation for this backend.
    #[cfg(feature = "infrastructure")]
    pub fn with_infrastructure(mut self, infrastructure: Arc<dyn Infrastructure>) -> Self {
        self.infrastructure = Some(infrastructure);
        self
    }

    #[cfg(feature = "infrastructure")]
    pub fn infrastructure(&self) -> Option<&dyn Infrastructure> {
        self.infrastructure.as_deref()
    }
}
