//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use kv_store::{ItemKey, KeyValueStore, KeyValueStoreExt};
use provider::ProviderLibrary;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /health: `ok` when the store answers a point read.
pub async fn check<S: KeyValueStore + 'static>(
    State(library): State<Arc<ProviderLibrary<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    let probe = ItemKey::new("health-probe");
    match library.store().exists(&library.tables().connections, &probe).await {
        Ok(_) => (StatusCode::OK, Json(HealthResponse { status: "ok" })),
        Err(err) => {
            tracing::warn!(error = %err, "store health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                }),
            )
        }
    }
}
