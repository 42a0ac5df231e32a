//! HTTP server implementation using Axum.

use crate::handler::{handle_health, handle_ws};
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use vision_assist_core::config::ServerConfig;
use vision_assist_core::Pipeline;

/// Application state shared across handlers.
pub struct AppState {
    /// Frame pipeline (governor, dispatcher, registry)
    pub pipeline: Arc<Pipeline>,
    /// Flips to `true` when connection loops must stop
    pub shutdown: watch::Receiver<bool>,
}

/// Handle to a running server. Dropping shuts it down.
pub struct ServerHandle {
    addr: SocketAddr,
    pipeline: Arc<Pipeline>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ServerHandle {
    /// Get the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of live WebSocket connections.
    pub fn connections(&self) -> usize {
        self.pipeline.registry().snapshot()
    }

    /// Shut down the server.
    ///
    /// Stops accepting new connections, signals every connection loop to
    /// close and clears the registry. Frames still in the model finish on
    /// their worker thread and their results are discarded.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
        let cleared = self.pipeline.registry().clear();
        if cleared > 0 {
            info!("Closed {} live connection(s) on shutdown", cleared);
        }
    }

    /// Shut down and wait for the accept loop to finish.
    pub async fn stop(mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Build the router for a pipeline.
pub fn router(state: Arc<AppState>) -> Router {
    // The mobile client connects from arbitrary origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(ServerConfig::HEALTH_PATH, get(handle_health))
        .route(ServerConfig::WS_PATH, get(handle_ws))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Start the HTTP/WebSocket server.
///
/// Returns once the listener is bound; the actual address is available from
/// the handle (useful when port=0). Failing to bind is the only fatal error.
pub async fn start_server(
    pipeline: Arc<Pipeline>,
    host: &str,
    port: u16,
) -> anyhow::Result<ServerHandle> {
    let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
    let state = Arc::new(AppState {
        pipeline: pipeline.clone(),
        shutdown: conn_shutdown_rx,
    });
    let app = router(state);

    // Parse the address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    // Bind to the address
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    // Spawn the server in the background
    let task_handle = tokio::spawn(async move {
        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await;

        match result {
            Ok(()) => info!("Server stopped accepting connections"),
            Err(e) => error!("Server error: {}", e),
        }
    });

    Ok(ServerHandle {
        addr: actual_addr,
        pipeline,
        shutdown_tx: Some(shutdown_tx),
        conn_shutdown_tx,
        task_handle: Some(task_handle),
    })
}
