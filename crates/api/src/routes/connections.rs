//! Connection data endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use kv_store::KeyValueStore;
use provider::{ConnectionDataEnvelope, ProviderLibrary};

use crate::error::ApiError;

/// PUT /connections/{id}
#[tracing::instrument(skip(library, data))]
pub async fn store<S: KeyValueStore + 'static>(
    State(library): State<Arc<ProviderLibrary<S>>>,
    Path(connection_id): Path<String>,
    Json(data): Json<ConnectionDataEnvelope>,
) -> Result<StatusCode, ApiError> {
    library.connections.store_data(&connection_id, &data).await?;
    Ok(StatusCode::OK)
}

/// GET /connections/{id}
#[tracing::instrument(skip(library))]
pub async fn fetch<S: KeyValueStore + 'static>(
    State(library): State<Arc<ProviderLibrary<S>>>,
    Path(connection_id): Path<String>,
) -> Result<Json<ConnectionDataEnvelope>, ApiError> {
    library
        .connections
        .fetch_data(&connection_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Connection {connection_id} not found")))
}

/// DELETE /connections/{id}
#[tracing::instrument(skip(library))]
pub async fn delete<S: KeyValueStore + 'static>(
    State(library): State<Arc<ProviderLibrary<S>>>,
    Path(connection_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if library.connections.delete_data(&connection_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "Connection {connection_id} not found"
        )))
    }
}
