//! HTTP control surface consumed by the dashboard: lifecycle control,
//! scan, simulation, log tailing, and the manual block form.

mod error;
mod handlers;

pub use error::{ApiError, ApiResult};

use crate::lifecycle::DetectorController;
use crate::logging::DetectorLog;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<DetectorController>,
    pub detector_log: Arc<DetectorLog>,
    pub simulation_log: Arc<DetectorLog>,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/detector/status", get(handlers::detector_status))
        .route("/detector/start", post(handlers::detector_start))
        .route("/detector/stop", post(handlers::detector_stop))
        .route("/scan", post(handlers::scan))
        .route("/simulate", post(handlers::simulate))
        .route("/logs/detector", get(handlers::detector_logs))
        .route("/logs/simulation", get(handlers::simulation_logs))
        .route("/block", post(handlers::block))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process shuts down.
pub async fn serve(state: AppState, bind: &str) -> std::io::Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{e}")))?;
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("control API listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}
