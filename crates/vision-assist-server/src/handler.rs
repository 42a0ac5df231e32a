//! Request handlers.

use crate::server::AppState;
use crate::transport::WsTransport;
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

/// Health check endpoint.
pub async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "connections": state.pipeline.registry().snapshot(),
        "clients": state.pipeline.registry().list(),
    }))
}

/// Upgrade to a WebSocket and run the frame loop for this client.
///
/// Accepts every client; the loop registers the connection before reading
/// and deregisters it when it ends.
pub async fn handle_ws(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let transport = WsTransport::new(socket);
        let shutdown = state.shutdown.clone();
        if let Err(e) = state
            .pipeline
            .run_connection(transport, Some(peer), shutdown)
            .await
        {
            warn!("WebSocket connection {} failed: {}", peer, e);
        }
    })
}
