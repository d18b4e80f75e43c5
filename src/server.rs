use anyhow::Result;
use arc_swap::ArcSwap;
use axum::{
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{config::Config, engine::Engine, handlers, handlers::query::AppState, metrics};

/// Start the log gateway server
///
/// This function:
/// 1. Initializes metrics
/// 2. Creates the engine and shared state
/// 3. Builds the Axum application
/// 4. Serves requests with graceful shutdown support
pub async fn start_server(config: Config) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let metrics_handle = Arc::new(metrics::init_metrics());

    // Wrap config in ArcSwap for atomic reload support
    let config_swap = Arc::new(ArcSwap::from_pointee(config.clone()));

    let app_state = AppState {
        config: config_swap,
        engine: Arc::new(Engine::new()),
    };

    let app = create_router(app_state, metrics_handle);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting log gateway on {}", addr);
    info!(
        "Configuration: query timeout {}s, push cap {} entries",
        config.limits.query_timeout_seconds, config.limits.max_entries_per_push
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
fn create_router(
    app_state: AppState,
    metrics_handle: Arc<metrics_exporter_prometheus::PrometheusHandle>,
) -> Router {
    let api_routes = Router::new()
        // current API
        .route("/loki/api/v1/query_range", get(handlers::query::query_range))
        .route("/loki/api/v1/query", get(handlers::query::instant_query))
        .route("/loki/api/v1/label", get(handlers::label::label_names))
        .route("/loki/api/v1/label/:name/values", get(handlers::label::label_values))
        .route("/loki/api/v1/tail", get(handlers::tail::tail))
        .route("/loki/api/v1/push", post(handlers::push::push))
        // legacy API, kept until the regexp parameter is fully deprecated
        .route("/api/prom/query", get(handlers::query::log_query))
        .route("/api/prom/label", get(handlers::label::label_names))
        .route("/api/prom/label/:name/values", get(handlers::label::label_values))
        .route("/api/prom/tail", get(handlers::tail::tail))
        .with_state(app_state);

    Router::new()
        // public endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::metrics_handler::metrics))
        .with_state(metrics_handle)
        .merge(api_routes)
        // browser clients connect to the tail endpoint directly
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                let _ = sig.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections...");
}
