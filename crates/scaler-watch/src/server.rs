//! HTTP server for health, readiness, state and metrics endpoints

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;

use scaler_stream::{metrics::encode_metrics, StreamingState};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub cluster_id: String,
    pub connected: bool,
    pub subscribed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct ServerState {
    pub cluster_id: String,
    pub stream: watch::Receiver<StreamingState>,
}

impl ServerState {
    pub fn new(cluster_id: impl Into<String>, stream: watch::Receiver<StreamingState>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            stream,
        }
    }

    fn health(&self, status: &str) -> HealthResponse {
        let snapshot = self.stream.borrow();
        HealthResponse {
            status: status.to_string(),
            cluster_id: self.cluster_id.clone(),
            connected: snapshot.is_connected,
            subscribed: snapshot.is_subscribed,
            error: snapshot.error.clone(),
        }
    }
}

/// Health endpoint - always 200 while the process runs
async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(state.health("ok"))
}

/// Ready endpoint - 200 only once the subscription is acknowledged
async fn ready(State(state): State<ServerState>) -> (StatusCode, Json<HealthResponse>) {
    let (connected, subscribed) = {
        let snapshot = state.stream.borrow();
        (snapshot.is_connected, snapshot.is_subscribed)
    };

    let (code, status) = if subscribed {
        (StatusCode::OK, "ready")
    } else if connected {
        (StatusCode::SERVICE_UNAVAILABLE, "subscribing")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_connected")
    };

    (code, Json(state.health(status)))
}

/// Latest streaming snapshot as JSON
async fn snapshot(State(state): State<ServerState>) -> Json<StreamingState> {
    Json(state.stream.borrow().clone())
}

/// Metrics endpoint - Prometheus text format
async fn metrics() -> impl IntoResponse {
    match encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/state", get(snapshot))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn run_server(addr: SocketAddr, state: ServerState) -> std::io::Result<()> {
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
