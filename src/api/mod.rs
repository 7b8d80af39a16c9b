pub mod handlers;
pub mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::daemon::DaemonManager;
use crate::db::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub manager: Arc<DaemonManager>,
    /// Interval used when daemons are started lazily.
    pub poll_interval: Duration,
}

pub fn router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/api/daemon", get(handlers::start_daemons))
        .route("/api/v1/health", get(handlers::health))
        .route(
            "/api/v1/wallets/{symbol}/deposit-address",
            post(handlers::generate_deposit_address),
        )
        .route(
            "/api/v1/wallets/{wallet_id}/deposits",
            get(handlers::list_deposits),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(state: AppState, host: &str, port: u16) -> eyre::Result<()> {
    let app = router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
