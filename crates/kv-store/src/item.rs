use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Address of an item within a table.
///
/// Tables either use composite keys (partition + sort) or partition keys
/// only. An item in a partition-only table has no sort key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub partition_key: String,
    pub sort_key: Option<String>,
}

impl ItemKey {
    /// Key for a partition-only table.
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    /// Composite key.
    pub fn with_sort_key(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: Some(sort_key.into()),
        }
    }

    pub fn sort_key(&self) -> Option<&str> {
        self.sort_key.as_deref()
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sort_key {
            Some(sort_key) => write!(f, "{}/{}", self.partition_key, sort_key),
            None => f.write_str(&self.partition_key),
        }
    }
}

/// A stored record: its key, a JSON document, and an optional expiry.
///
/// Items past their expiry are treated as absent by every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub key: ItemKey,
    pub attributes: serde_json::Value,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Creates a non-expiring item from a raw JSON document.
    pub fn new(key: ItemKey, attributes: serde_json::Value) -> Self {
        Self {
            key,
            attributes,
            expires_at: None,
        }
    }

    /// Creates an item from a serializable value.
    pub fn from_value<T: Serialize>(key: ItemKey, value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(key, serde_json::to_value(value)?))
    }

    /// Sets the expiry.
    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Deserializes the attributes into a concrete type.
    pub fn into_value<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.attributes)
    }

    /// Whether the item is still visible at `now`.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}
