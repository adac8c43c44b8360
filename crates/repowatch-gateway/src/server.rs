//! HTTP server implementation using Axum.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use repowatch_core::config::GatewayConfig;
use repowatch_scheduler::MonitorService;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub gateway_config: GatewayConfig,
    /// Monitor registry; the scheduler reads the same store on its next tick.
    pub monitors: Arc<MonitorService>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(gateway_config: GatewayConfig, monitors: Arc<MonitorService>) -> Self {
        Self {
            gateway_config,
            monitors,
            start_time: std::time::Instant::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(super::routes::health_check))
        .route(
            "/api/v1/monitors",
            get(super::routes::list_monitors).post(super::routes::create_monitor),
        )
        .route("/api/v1/monitors/stop", post(super::routes::stop_monitors))
        .route("/api/v1/monitors/resume", post(super::routes::resume_monitors))
        .route("/api/v1/monitors/delete", post(super::routes::delete_monitors))
        .route(
            "/api/v1/monitors/{id}",
            put(super::routes::update_monitor).get(super::routes::get_monitor),
        )
        .route(
            "/api/v1/monitors/{id}/executions",
            get(super::routes::list_executions),
        )
        .route("/api/v1/monitors/{id}/events", get(super::routes::list_events))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared)
}

/// Serve the API until `shutdown` resolves.
pub async fn start(
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.gateway_config.host, state.gateway_config.port);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
