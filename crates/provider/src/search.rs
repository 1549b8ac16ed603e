//! Read model search filters.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ProviderError, Result};

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperation {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "not-contains")]
    NotContains,
    #[serde(rename = "begins-with")]
    BeginsWith,
}

/// A condition on one top-level property of a read model document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub property: String,
    pub operation: FilterOperation,
    pub values: Vec<Value>,
}

impl Filter {
    pub fn new(property: impl Into<String>, operation: FilterOperation, values: Vec<Value>) -> Self {
        Self {
            property: property.into(),
            operation,
            values,
        }
    }

    /// Single-operand filter.
    pub fn single(property: impl Into<String>, operation: FilterOperation, value: Value) -> Self {
        Self::new(property, operation, vec![value])
    }

    /// Checks the operand count for the operation.
    pub fn validate(&self) -> Result<()> {
        let arity_ok = match self.operation {
            FilterOperation::In => !self.values.is_empty(),
            FilterOperation::Between => self.values.len() == 2,
            _ => self.values.len() == 1,
        };
        if self.property.is_empty() {
            return Err(ProviderError::InvalidFilter(
                "filter property is empty".to_string(),
            ));
        }
        if !arity_ok {
            return Err(ProviderError::InvalidFilter(format!(
                "{:?} on `{}` got {} value(s)",
                self.operation,
                self.property,
                self.values.len()
            )));
        }
        Ok(())
    }

    /// Whether a document satisfies this filter.
    ///
    /// Expects a validated filter. A missing property only satisfies the
    /// negative operations.
    pub fn matches(&self, document: &Value) -> bool {
        let Some(actual) = document.get(&self.property) else {
            return matches!(
                self.operation,
                FilterOperation::Ne | FilterOperation::NotContains
            );
        };
        let null = Value::Null;
        let first = self.values.first().unwrap_or(&null);

        match self.operation {
            FilterOperation::Eq => equals(actual, first),
            FilterOperation::Ne => !equals(actual, first),
            FilterOperation::Lt => compare(actual, first) == Some(Ordering::Less),
            FilterOperation::Gt => compare(actual, first) == Some(Ordering::Greater),
            FilterOperation::Lte => {
                matches!(compare(actual, first), Some(Ordering::Less | Ordering::Equal))
            }
            FilterOperation::Gte => {
                matches!(
                    compare(actual, first),
                    Some(Ordering::Greater | Ordering::Equal)
                )
            }
            FilterOperation::In => self.values.iter().any(|value| equals(actual, value)),
            FilterOperation::Between => {
                let (Some(low), Some(high)) = (self.values.first(), self.values.get(1)) else {
                    return false;
                };
                matches!(
                    compare(actual, low),
                    Some(Ordering::Greater | Ordering::Equal)
                ) && matches!(compare(actual, high), Some(Ordering::Less | Ordering::Equal))
            }
            FilterOperation::Contains => contains(actual, first),
            FilterOperation::NotContains => !contains(actual, first),
            FilterOperation::BeginsWith => match (actual, first) {
                (Value::String(actual), Value::String(prefix)) => actual.starts_with(prefix.as_str()),
                _ => false,
            },
        }
    }
}

/// Whether a document satisfies every filter.
pub fn matches_all(filters: &[Filter], document: &Value) -> bool {
    filters.iter().all(|filter| filter.matches(document))
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        (Value::Array(items), needle) => items.iter().any(|item| equals(item, needle)),
        _ => false,
    }
}
