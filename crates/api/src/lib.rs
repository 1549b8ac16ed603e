//! HTTP API server exposing the provider library.
//!
//! Provides REST endpoints for events, read models, subscriptions and
//! connection data, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use kv_store::KeyValueStore;
use metrics_exporter_prometheus::PrometheusHandle;
use provider::ProviderLibrary;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: KeyValueStore + 'static>(
    library: Arc<ProviderLibrary<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/events", post(routes::events::store::<S>))
        .route("/entities/{entity_type}", get(routes::events::entity_ids::<S>))
        .route(
            "/entities/{entity_type}/{entity_id}/events",
            get(routes::events::for_entity_since::<S>),
        )
        .route(
            "/entities/{entity_type}/{entity_id}/snapshot",
            get(routes::events::latest_snapshot::<S>),
        )
        .route("/read-models/{name}", put(routes::read_models::store::<S>))
        .route("/read-models/{name}/{id}", get(routes::read_models::fetch::<S>))
        .route("/search/{name}", post(routes::read_models::search::<S>))
        .route("/subscriptions", post(routes::subscriptions::subscribe::<S>))
        .route(
            "/subscriptions/{read_model}",
            get(routes::subscriptions::fetch::<S>),
        )
        .route(
            "/connections/{connection_id}",
            put(routes::connections::store::<S>)
                .get(routes::connections::fetch::<S>)
                .delete(routes::connections::delete::<S>),
        )
        .route(
            "/connections/{connection_id}/subscriptions",
            delete(routes::subscriptions::delete_all::<S>),
        )
        .route(
            "/connections/{connection_id}/subscriptions/{subscription_id}",
            delete(routes::subscriptions::delete::<S>),
        )
        .with_state(library)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
