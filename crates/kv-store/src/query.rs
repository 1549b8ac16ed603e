use crate::ItemKey;

/// Restriction on the sort keys returned by a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SortKeyCondition {
    /// Every item in the partition.
    #[default]
    Any,
    Equals(String),
    BeginsWith(String),
    /// Strictly greater, byte-wise.
    GreaterThan(String),
    /// Inclusive on both ends.
    Between(String, String),
}

impl SortKeyCondition {
    /// Whether an item with this sort key satisfies the condition.
    ///
    /// Items without a sort key only satisfy [`SortKeyCondition::Any`].
    pub fn matches(&self, sort_key: Option<&str>) -> bool {
        match (self, sort_key) {
            (Self::Any, _) => true,
            (_, None) => false,
            (Self::Equals(expected), Some(key)) => key == expected,
            (Self::BeginsWith(prefix), Some(key)) => key.starts_with(prefix.as_str()),
            (Self::GreaterThan(bound), Some(key)) => key > bound.as_str(),
            (Self::Between(low, high), Some(key)) => key >= low.as_str() && key <= high.as_str(),
        }
    }
}

/// Query over the items of a single partition.
///
/// Results come back ordered by sort key, ascending unless
/// [`ItemQuery::descending`] is set, and are truncated to `limit` after the
/// condition is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemQuery {
    pub partition_key: String,
    pub condition: SortKeyCondition,
    pub descending: bool,
    pub limit: Option<usize>,
}

impl ItemQuery {
    /// Creates a query for every item in a partition.
    pub fn partition(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            condition: SortKeyCondition::Any,
            descending: false,
            limit: None,
        }
    }

    /// Restricts the sort keys returned.
    pub fn sort_key(mut self, condition: SortKeyCondition) -> Self {
        self.condition = condition;
        self
    }

    /// Only sort keys strictly after `sort_key`.
    pub fn after(self, sort_key: impl Into<String>) -> Self {
        self.sort_key(SortKeyCondition::GreaterThan(sort_key.into()))
    }

    /// Only sort keys starting with `prefix`.
    pub fn begins_with(self, prefix: impl Into<String>) -> Self {
        self.sort_key(SortKeyCondition::BeginsWith(prefix.into()))
    }

    /// Returns items newest sort key first.
    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// Limits the number of items returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Key prefixes restricting a table scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    pub partition_key_prefix: Option<String>,
    pub sort_key_prefix: Option<String>,
}

impl ScanFilter {
    /// A filter that matches every item.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only items whose partition key starts with `prefix`.
    pub fn partition_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.partition_key_prefix = Some(prefix.into());
        self
    }

    /// Only items whose sort key starts with `prefix`.
    pub fn sort_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sort_key_prefix = Some(prefix.into());
        self
    }

    pub fn matches(&self, key: &ItemKey) -> bool {
        if let Some(prefix) = &self.partition_key_prefix
            && !key.partition_key.starts_with(prefix.as_str())
        {
            return false;
        }
        if let Some(prefix) = &self.sort_key_prefix {
            return key
                .sort_key()
                .is_some_and(|sort_key| sort_key.starts_with(prefix.as_str()));
        }
        true
    }
}
