//! Read model endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use kv_store::KeyValueStore;
use provider::{Filter, ProviderLibrary};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;

#[derive(Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub filters: Vec<Filter>,
}

/// PUT /read-models/{name}: insert or replace a document by its `id`.
#[tracing::instrument(skip(library, value))]
pub async fn store<S: KeyValueStore + 'static>(
    State(library): State<Arc<ProviderLibrary<S>>>,
    Path(read_model_name): Path<String>,
    Json(value): Json<Value>,
) -> Result<StatusCode, ApiError> {
    library.read_models.store(&read_model_name, &value).await?;
    Ok(StatusCode::OK)
}

/// GET /read-models/{name}/{id}
#[tracing::instrument(skip(library))]
pub async fn fetch<S: KeyValueStore + 'static>(
    State(library): State<Arc<ProviderLibrary<S>>>,
    Path((read_model_name, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    library
        .read_models
        .fetch(&read_model_name, &id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("{read_model_name} {id} not found")))
}

/// POST /search/{name}: documents matching every filter.
#[tracing::instrument(skip(library, request))]
pub async fn search<S: KeyValueStore + 'static>(
    State(library): State<Arc<ProviderLibrary<S>>>,
    Path(read_model_name): Path<String>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let results = library
        .read_models
        .search(&read_model_name, &request.filters)
        .await?;
    Ok(Json(results))
}
