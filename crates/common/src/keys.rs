//! Record key derivation.
//!
//! Partition and sort keys are built by joining identifiers with
//! [`KEY_DELIMITER`]. These strings are persisted as literal record keys, so
//! the formats below must not change:
//!
//! | Key | Format | Example |
//! |---|---|---|
//! | event partition | `{entity_type_name}-{entity_id}-{kind}` | `Cart-abc123-event` |
//! | entity index partition | `{entity_type_name}-{kind}` | `Cart-event` |
//! | subscription sort | `{connection_id}-{subscription_id}` | `conn42-sub7` |
//!
//! The plain derivation functions never fail and never inspect their
//! inputs. A key only parses back into the same tuple when its leading
//! component (entity type name, connection id) is free of the delimiter;
//! the `try_` variants check that before deriving.

use crate::EnvelopeKind;

/// Separator between key components.
pub const KEY_DELIMITER: char = '-';

/// Partition key addressing the envelopes of one entity instance.
///
/// Use `EnvelopeKind::default()` for the event stream. An entity type name
/// containing [`KEY_DELIMITER`] can collide with another entity's key.
pub fn partition_key_for_event(
    entity_type_name: &str,
    entity_id: &str,
    kind: EnvelopeKind,
) -> String {
    format!("{entity_type_name}{KEY_DELIMITER}{entity_id}{KEY_DELIMITER}{kind}")
}

/// Partition key of the index enumerating all entities of a type and kind.
pub fn partition_key_for_index_by_entity(entity_type_name: &str, kind: EnvelopeKind) -> String {
    format!("{entity_type_name}{KEY_DELIMITER}{kind}")
}

/// Sort key distinguishing the subscriptions held by one connection.
///
/// Every key for a connection starts with [`subscription_sort_key_prefix`],
/// which is what makes per-connection prefix scans work. A connection id
/// containing [`KEY_DELIMITER`] breaks that.
pub fn sort_key_for_subscription(connection_id: &str, subscription_id: &str) -> String {
    format!("{connection_id}{KEY_DELIMITER}{subscription_id}")
}

/// Prefix shared by all subscription sort keys of a connection.
pub fn subscription_sort_key_prefix(connection_id: &str) -> String {
    format!("{connection_id}{KEY_DELIMITER}")
}

/// Errors for key components that would make a key ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("key component `{component}` is empty")]
    Empty { component: &'static str },

    #[error("key component `{component}` contains the key delimiter: {value}")]
    ContainsDelimiter {
        component: &'static str,
        value: String,
    },

    #[error("malformed key: {0}")]
    Malformed(String),
}

/// Checks that a key component is non-empty and delimiter-free.
pub fn validate_key_component(component: &'static str, value: &str) -> Result<(), KeyError> {
    if value.is_empty() {
        return Err(KeyError::Empty { component });
    }
    if value.contains(KEY_DELIMITER) {
        return Err(KeyError::ContainsDelimiter {
            component,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn require_non_empty(component: &'static str, value: &str) -> Result<(), KeyError> {
    if value.is_empty() {
        Err(KeyError::Empty { component })
    } else {
        Ok(())
    }
}

/// Like [`partition_key_for_event`], but rejects inputs whose key would not
/// parse back uniquely.
///
/// The entity id may contain the delimiter (UUIDs do): the kind is a closed
/// set and the type name is delimiter-free, so the id is whatever lies
/// between them.
pub fn try_partition_key_for_event(
    entity_type_name: &str,
    entity_id: &str,
    kind: EnvelopeKind,
) -> Result<String, KeyError> {
    validate_key_component("entity_type_name", entity_type_name)?;
    require_non_empty("entity_id", entity_id)?;
    Ok(partition_key_for_event(entity_type_name, entity_id, kind))
}

/// Like [`partition_key_for_index_by_entity`], with a validated type name.
pub fn try_partition_key_for_index_by_entity(
    entity_type_name: &str,
    kind: EnvelopeKind,
) -> Result<String, KeyError> {
    validate_key_component("entity_type_name", entity_type_name)?;
    Ok(partition_key_for_index_by_entity(entity_type_name, kind))
}

/// Like [`sort_key_for_subscription`], with a validated connection id.
pub fn try_sort_key_for_subscription(
    connection_id: &str,
    subscription_id: &str,
) -> Result<String, KeyError> {
    validate_key_component("connection_id", connection_id)?;
    require_non_empty("subscription_id", subscription_id)?;
    Ok(sort_key_for_subscription(connection_id, subscription_id))
}

/// Components recovered from an event partition key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPartitionKey {
    pub entity_type_name: String,
    pub entity_id: String,
    pub kind: EnvelopeKind,
}

/// Components recovered from a subscription sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSortKey {
    pub connection_id: String,
    pub subscription_id: String,
}

/// Splits an event partition key into its components.
pub fn parse_event_partition_key(key: &str) -> Result<EventPartitionKey, KeyError> {
    let malformed = || KeyError::Malformed(key.to_string());

    let (entity_type_name, rest) = key.split_once(KEY_DELIMITER).ok_or_else(malformed)?;
    let (entity_id, kind) = rest.rsplit_once(KEY_DELIMITER).ok_or_else(malformed)?;
    let kind = kind.parse::<EnvelopeKind>().map_err(|_| malformed())?;
    if entity_type_name.is_empty() || entity_id.is_empty() {
        return Err(malformed());
    }

    Ok(EventPartitionKey {
        entity_type_name: entity_type_name.to_string(),
        entity_id: entity_id.to_string(),
        kind,
    })
}

/// Splits a subscription sort key into its components.
pub fn parse_subscription_sort_key(key: &str) -> Result<SubscriptionSortKey, KeyError> {
    match key.split_once(KEY_DELIMITER) {
        Some((connection_id, subscription_id))
            if !connection_id.is_empty() && !subscription_id.is_empty() =>
        {
            Ok(SubscriptionSortKey {
                connection_id: connection_id.to_string(),
                subscription_id: subscription_id.to_string(),
            })
        }
        _ => Err(KeyError::Malformed(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_partition_key_default_kind() {
        assert_eq!(
            partition_key_for_event("Cart", "abc123", EnvelopeKind::default()),
            "Cart-abc123-event"
        );
    }

    #[test]
    fn event_partition_key_snapshot_kind() {
        assert_eq!(
            partition_key_for_event("Cart", "abc123", EnvelopeKind::Snapshot),
            "Cart-abc123-snapshot"
        );
    }

    #[test]
    fn index_partition_key() {
        assert_eq!(
            partition_key_for_index_by_entity("Cart", EnvelopeKind::Event),
            "Cart-event"
        );
    }

    #[test]
    fn subscription_sort_key() {
        assert_eq!(sort_key_for_subscription("conn42", "sub7"), "conn42-sub7");
        assert!(sort_key_for_subscription("conn42", "sub7").starts_with(
            &subscription_sort_key_prefix("conn42")
        ));
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = partition_key_for_event("Cart", "abc123", EnvelopeKind::Event);
        let b = partition_key_for_event("Cart", "abc123", EnvelopeKind::Event);
        assert_eq!(a, b);
    }

    #[test]
    fn unchecked_derivation_accepts_anything() {
        assert_eq!(partition_key_for_event("", "", EnvelopeKind::Event), "--event");
        assert_eq!(sort_key_for_subscription("a-b", "c"), "a-b-c");
    }

    #[test]
    fn delimiter_in_type_name_collides() {
        let a = partition_key_for_event("Shop-Cart", "1", EnvelopeKind::Event);
        let b = partition_key_for_event("Shop", "Cart-1", EnvelopeKind::Event);
        assert_eq!(a, b);

        let err = try_partition_key_for_event("Shop-Cart", "1", EnvelopeKind::Event).unwrap_err();
        assert!(matches!(
            err,
            KeyError::ContainsDelimiter {
                component: "entity_type_name",
                ..
            }
        ));
    }

    #[test]
    fn delimiter_in_connection_id_is_rejected() {
        let err = try_sort_key_for_subscription("conn-42", "sub7").unwrap_err();
        assert_eq!(
            err,
            KeyError::ContainsDelimiter {
                component: "connection_id",
                value: "conn-42".to_string(),
            }
        );
    }

    #[test]
    fn empty_components_are_rejected() {
        assert_eq!(
            try_partition_key_for_event("Cart", "", EnvelopeKind::Event),
            Err(KeyError::Empty {
                component: "entity_id"
            })
        );
        assert_eq!(
            try_partition_key_for_index_by_entity("", EnvelopeKind::Event),
            Err(KeyError::Empty {
                component: "entity_type_name"
            })
        );
        assert_eq!(
            try_sort_key_for_subscription("conn42", ""),
            Err(KeyError::Empty {
                component: "subscription_id"
            })
        );
    }

    #[test]
    fn validated_event_key_parses_back_with_uuid_ids() {
        let id = "0b6f1c1e-8d0a-4e55-9d3b-2f7f0c6a1b11";
        for kind in [EnvelopeKind::Event, EnvelopeKind::Snapshot] {
            let key = try_partition_key_for_event("Cart", id, kind).unwrap();
            let parsed = parse_event_partition_key(&key).unwrap();
            assert_eq!(
                parsed,
                EventPartitionKey {
                    entity_type_name: "Cart".to_string(),
                    entity_id: id.to_string(),
                    kind,
                }
            );
        }
    }

    #[test]
    fn validated_subscription_key_parses_back() {
        let key = try_sort_key_for_subscription("conn42", "sub-7-a").unwrap();
        let parsed = parse_subscription_sort_key(&key).unwrap();
        assert_eq!(parsed.connection_id, "conn42");
        assert_eq!(parsed.subscription_id, "sub-7-a");
    }

    #[test]
    fn malformed_keys_do_not_parse() {
        assert!(parse_event_partition_key("Cart").is_err());
        assert!(parse_event_partition_key("Cart-abc123").is_err());
        assert!(parse_event_partition_key("Cart-abc123-other").is_err());
        assert!(parse_event_partition_key("-abc-event").is_err());
        assert!(parse_subscription_sort_key("conn42").is_err());
        assert!(parse_subscription_sort_key("conn42-").is_err());
    }
}
