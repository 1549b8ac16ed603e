//! API server entry point.

use std::sync::Arc;

use api::config::{Config, StoreBackend};
use kv_store::{InMemoryKeyValueStore, KeyValueStore, PostgresKeyValueStore};
use metrics_exporter_prometheus::PrometheusHandle;
use provider::{ProviderLibrary, TableNames};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[cfg(feature = "infrastructure")]
use provider::infrastructure::{InMemoryInfrastructure, PostgresInfrastructure};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Prepares storage if the library carries an infrastructure, then serves
/// until shutdown.
async fn serve<S: KeyValueStore + 'static>(
    config: &Config,
    library: ProviderLibrary<S>,
    metrics_handle: PrometheusHandle,
) {
    #[cfg(feature = "infrastructure")]
    if let Some(infrastructure) = library.infrastructure() {
        infrastructure
            .prepare(library.tables(), &config.read_models)
            .await
            .expect("failed to prepare storage");
        tracing::info!(infrastructure = infrastructure.name(), "storage prepared");
    }

    let app = api::create_app(Arc::new(library), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, backend = config.backend.as_str(), "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env().expect("invalid configuration");
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let tables = TableNames::new(&config.app_name, &config.environment);

    // 3. Connect the configured store and serve
    match config.backend {
        StoreBackend::Memory => {
            let library = ProviderLibrary::new(Arc::new(InMemoryKeyValueStore::new()), tables);
            #[cfg(feature = "infrastructure")]
            let library = library.with_infrastructure(Arc::new(InMemoryInfrastructure));
            serve(&config, library, metrics_handle).await;
        }
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .expect("DATABASE_URL is checked by Config::from_env");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
                .expect("failed to connect to database");
            let store = PostgresKeyValueStore::new(pool);

            #[cfg(feature = "infrastructure")]
            let infrastructure = Arc::new(PostgresInfrastructure::new(store.clone()));
            let library = ProviderLibrary::new(Arc::new(store), tables);
            #[cfg(feature = "infrastructure")]
            let library = library.with_infrastructure(infrastructure);
            serve(&config, library, metrics_handle).await;
        }
        #[cfg(feature = "dynamo")]
        StoreBackend::Dynamo => {
            let store =
                kv_store::DynamoKeyValueStore::new(config.dynamo_endpoint_url.as_deref()).await;

            #[cfg(feature = "infrastructure")]
            let infrastructure = Arc::new(provider::infrastructure::DynamoInfrastructure::new(
                store.clone(),
            ));
            let library = ProviderLibrary::new(Arc::new(store), tables);
            #[cfg(feature = "infrastructure")]
            let library = library.with_infrastructure(infrastructure);
            serve(&config, library, metrics_handle).await;
        }
        #[cfg(not(feature = "dynamo"))]
        StoreBackend::Dynamo => {
            tracing::error!("STORE_BACKEND=dynamo requires building with the `dynamo` feature");
            std::process::exit(1);
        }
    }
}
