//! Storage preparation run once per deployment.

use async_trait::async_trait;
use kv_store::{PostgresKeyValueStore, StoreError};

use crate::{Result, TableNames};

/// Prepares a backend so the provider adapters can use it.
#[async_trait]
pub trait Infrastructure: Send + Sync {
    fn name(&self) -> &'static str;

    /// Creates whatever the tables of an application need. Safe to repeat.
    async fn prepare(&self, tables: &TableNames, read_models: &[String]) -> Result<()>;
}

/// Nothing to prepare for the in-memory store.
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryInfrastructure;

#[async_trait]
impl Infrastructure for InMemoryInfrastructure {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn prepare(&self, _tables: &TableNames, _read_models: &[String]) -> Result<()> {
        Ok(())
    }
}

/// Runs the schema migrations. Logical tables share one physical table, so
/// the names are not needed.
#[derive(Clone)]
pub struct PostgresInfrastructure {
    store: PostgresKeyValueStore,
}

impl PostgresInfrastructure {
    pub fn new(store: PostgresKeyValueStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Infrastructure for PostgresInfrastructure {
    fn name(&self) -> &'static str {
        "postgres"
    }

    #[tracing::instrument(skip_all)]
    async fn prepare(&self, _tables: &TableNames, _read_models: &[String]) -> Result<()> {
        self.store
            .run_migrations()
            .await
            .map_err(StoreError::Migration)?;
        tracing::info!("Database migrations completed");
        Ok(())
    }
}

#[cfg(feature = "dynamo")]
pub use dynamo::DynamoInfrastructure;

#[cfg(feature = "dynamo")]
mod dynamo {
    use async_trait::async_trait;
    use kv_store::DynamoKeyValueStore;

    use super::Infrastructure;
    use crate::{Result, TableNames};

    /// Creates one DynamoDB table per logical table.
    #[derive(Clone)]
    pub struct DynamoInfrastructure {
        store: DynamoKeyValueStore,
    }

    impl DynamoInfrastructure {
        pub fn new(store: DynamoKeyValueStore) -> Self {
            Self { store }
        }
    }

    #[async_trait]
    impl Infrastructure for DynamoInfrastructure {
        fn name(&self) -> &'static str {
            "dynamo"
        }

        #[tracing::instrument(skip_all, fields(read_models = read_models.len()))]
        async fn prepare(&self, tables: &TableNames, read_models: &[String]) -> Result<()> {
            for table in tables.composite_key_tables() {
                self.store.create_table(table, true).await?;
            }
            self.store.create_table(&tables.connections, false).await?;
            for read_model in read_models {
                self.store
                    .create_table(&tables.read_model(read_model), false)
                    .await?;
            }
            tracing::info!("DynamoDB tables ready");
            Ok(())
        }
    }
}
