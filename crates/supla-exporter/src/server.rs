//! HTTP exposition server: `/metrics` and `/health`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use supla_core::AttemptCounter;

use crate::error::{ExporterError, ExporterResult};
use crate::metrics::PrometheusSink;

/// Shared server state passed to all handlers via axum State.
pub struct ServerState {
    pub sink: Arc<PrometheusSink>,
    pub counter: Arc<AttemptCounter>,
    /// Number of configured devices.
    pub devices: usize,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(handle_metrics))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, state: Arc<ServerState>, shutdown: F) -> ExporterResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "starting metrics server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ExporterError::Server(e.to_string()))
}

async fn handle_metrics(State(state): State<Arc<ServerState>>) -> Response {
    match state.sink.render() {
        Ok(body) => ([(CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn handle_health(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    let last = state.sink.last_batch();
    Json(serde_json::json!({
        "status": "ok",
        "devices": state.devices,
        "last_cycle": {
            "records": last.devices,
            "up": last.up,
            "attempts": last.attempts,
        },
        "attempts": state.counter.read(),
    }))
}
