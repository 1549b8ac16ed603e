//! Subscription endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use kv_store::KeyValueStore;
use provider::{ProviderLibrary, SubscriptionEnvelope};
use serde::Serialize;

use crate::error::ApiError;

#[derive(Serialize)]
pub struct DeletedResponse {
    pub deleted: usize,
}

/// POST /subscriptions
#[tracing::instrument(skip(library, envelope))]
pub async fn subscribe<S: KeyValueStore + 'static>(
    State(library): State<Arc<ProviderLibrary<S>>>,
    Json(envelope): Json<SubscriptionEnvelope>,
) -> Result<StatusCode, ApiError> {
    library.subscriptions.subscribe(&envelope).await?;
    Ok(StatusCode::OK)
}

/// GET /subscriptions/{read_model}
#[tracing::instrument(skip(library))]
pub async fn fetch<S: KeyValueStore + 'static>(
    State(library): State<Arc<ProviderLibrary<S>>>,
    Path(read_model_name): Path<String>,
) -> Result<Json<Vec<SubscriptionEnvelope>>, ApiError> {
    let subscriptions = library
        .subscriptions
        .fetch_subscriptions(&read_model_name)
        .await?;
    Ok(Json(subscriptions))
}

/// DELETE /connections/{id}/subscriptions/{subscription_id}
#[tracing::instrument(skip(library))]
pub async fn delete<S: KeyValueStore + 'static>(
    State(library): State<Arc<ProviderLibrary<S>>>,
    Path((connection_id, subscription_id)): Path<(String, String)>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted = library
        .subscriptions
        .delete_subscription(&connection_id, &subscription_id)
        .await?;
    Ok(Json(DeletedResponse { deleted }))
}

/// DELETE /connections/{id}/subscriptions
#[tracing::instrument(skip(library))]
pub async fn delete_all<S: KeyValueStore + 'static>(
    State(library): State<Arc<ProviderLibrary<S>>>,
    Path(connection_id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted = library
        .subscriptions
        .delete_all_subscriptions(&connection_id)
        .await?;
    Ok(Json(DeletedResponse { deleted }))
}
