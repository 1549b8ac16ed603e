use chrono::{DateTime, Utc};
use common::{EntityId, EnvelopeKind};
use serde::{Deserialize, Serialize};

/// A persisted record wrapping one event, or one snapshot, of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// The request that produced this envelope.
    #[serde(rename = "requestID")]
    pub request_id: String,

    /// The event type (e.g., "CartCreated"), or the entity type for snapshots.
    pub type_name: String,

    /// The type of entity (e.g., "Cart").
    pub entity_type_name: String,

    /// The entity this envelope belongs to.
    #[serde(rename = "entityID")]
    pub entity_id: EntityId,

    pub kind: EnvelopeKind,

    /// Schema version of `value`.
    pub version: i64,

    /// The event or snapshot payload.
    pub value: serde_json::Value,

    pub created_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// Creates a new event envelope builder.
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }

    /// Deserializes the payload into a concrete type.
    pub fn value_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.value.clone())
    }
}

/// Builder for constructing event envelopes.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    request_id: Option<String>,
    type_name: Option<String>,
    entity_type_name: Option<String>,
    entity_id: Option<EntityId>,
    kind: EnvelopeKind,
    version: Option<i64>,
    value: Option<serde_json::Value>,
    created_at: Option<DateTime<Utc>>,
}

impl EventEnvelopeBuilder {
    /// Sets the request ID. If not set, an empty ID is used.
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Sets the type name.
    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Sets the entity type name.
    pub fn entity_type_name(mut self, entity_type_name: impl Into<String>) -> Self {
        self.entity_type_name = Some(entity_type_name.into());
        self
    }

    /// Sets the entity ID.
    pub fn entity_id(mut self, entity_id: impl Into<EntityId>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Sets the kind. Defaults to [`EnvelopeKind::Event`].
    pub fn kind(mut self, kind: EnvelopeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the version. If not set, version 1 is used.
    pub fn version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the value from a serializable payload.
    pub fn value<T: Serialize>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        self.value = Some(serde_json::to_value(value)?);
        Ok(self)
    }

    /// Sets the value from a raw JSON payload.
    pub fn value_raw(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Sets the creation time. If not set, the current time will be used.
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Builds the event envelope.
    ///
    /// # Panics
    ///
    /// Panics if required fields (type_name, entity_type_name, entity_id, value)
    /// are not set.
    pub fn build(self) -> EventEnvelope {
        EventEnvelope {
            request_id: self.request_id.unwrap_or_default(),
            type_name: self.type_name.expect("type_name is required"),
            entity_type_name: self.entity_type_name.expect("entity_type_name is required"),
            entity_id: self.entity_id.expect("entity_id is required"),
            kind: self.kind,
            version: self.version.unwrap_or(1),
            value: self.value.expect("value is required"),
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }

    /// Tries to build the event envelope, returning None if required fields are missing.
    pub fn try_build(self) -> Option<EventEnvelope> {
        Some(EventEnvelope {
            request_id: self.request_id.unwrap_or_default(),
            type_name: self.type_name?,
            entity_type_name: self.entity_type_name?,
            entity_id: self.entity_id?,
            kind: self.kind,
            version: self.version.unwrap_or(1),
            value: self.value?,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        })
    }
}
