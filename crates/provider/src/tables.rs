//! Physical table names for one application environment.

/// Names of the tables a provider library reads and writes.
///
/// Every name is prefixed with `{app_name}-{environment}` so several
/// applications and environments can share one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    prefix: String,
    pub events: String,
    pub events_index: String,
    pub subscriptions: String,
    pub connections: String,
}

impl TableNames {
    pub fn new(app_name: &str, environment: &str) -> Self {
        let prefix = format!("{app_name}-{environment}");
        Self {
            events: format!("{prefix}-events-store"),
            events_index: format!("{prefix}-events-index"),
            subscriptions: format!("{prefix}-subscriptions-store"),
            connections: format!("{prefix}-connections-store"),
            prefix,
        }
    }

    /// Table holding the documents of one read model.
    pub fn read_model(&self, read_model_name: &str) -> String {
        format!("{}-{read_model_name}", self.prefix)
    }

    /// Tables keyed by partition and sort key.
    pub fn composite_key_tables(&self) -> [&str; 3] {
        [&self.events, &self.events_index, &self.subscriptions]
    }
}
