//! Event store endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use common::{EntityId, EnvelopeKind};
use kv_store::KeyValueStore;
use provider::{EventEnvelope, ProviderLibrary};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Deserialize)]
pub struct EntityIdsQuery {
    #[serde(default)]
    pub kind: EnvelopeKind,
}

#[derive(Deserialize)]
pub struct EventsSinceQuery {
    pub since: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct StoredResponse {
    pub stored: usize,
}

/// POST /events: store a batch of envelopes in order.
#[tracing::instrument(skip(library, envelopes), fields(count = envelopes.len()))]
pub async fn store<S: KeyValueStore + 'static>(
    State(library): State<Arc<ProviderLibrary<S>>>,
    Json(envelopes): Json<Vec<EventEnvelope>>,
) -> Result<Json<StoredResponse>, ApiError> {
    library.events.store(&envelopes).await?;
    Ok(Json(StoredResponse {
        stored: envelopes.len(),
    }))
}

/// GET /entities/{type}: ids of the entities of a type.
#[tracing::instrument(skip(library, query))]
pub async fn entity_ids<S: KeyValueStore + 'static>(
    State(library): State<Arc<ProviderLibrary<S>>>,
    Path(entity_type_name): Path<String>,
    Query(query): Query<EntityIdsQuery>,
) -> Result<Json<Vec<EntityId>>, ApiError> {
    let ids = library
        .events
        .entity_ids(&entity_type_name, query.kind)
        .await?;
    Ok(Json(ids))
}

/// GET /entities/{type}/{id}/events: events stored after `since`.
#[tracing::instrument(skip(library, query))]
pub async fn for_entity_since<S: KeyValueStore + 'static>(
    State(library): State<Arc<ProviderLibrary<S>>>,
    Path((entity_type_name, entity_id)): Path<(String, String)>,
    Query(query): Query<EventsSinceQuery>,
) -> Result<Json<Vec<EventEnvelope>>, ApiError> {
    let events = library
        .events
        .for_entity_since(&entity_type_name, &EntityId::from(entity_id), query.since)
        .await?;
    Ok(Json(events))
}

/// GET /entities/{type}/{id}/snapshot: the latest snapshot.
#[tracing::instrument(skip(library))]
pub async fn latest_snapshot<S: KeyValueStore + 'static>(
    State(library): State<Arc<ProviderLibrary<S>>>,
    Path((entity_type_name, entity_id)): Path<(String, String)>,
) -> Result<Json<EventEnvelope>, ApiError> {
    library
        .events
        .latest_entity_snapshot(&entity_type_name, &EntityId::from(entity_id.as_str()))
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!("No snapshot for {entity_type_name} {entity_id}"))
        })
}
