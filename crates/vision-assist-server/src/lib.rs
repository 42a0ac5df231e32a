//! HTTP/WebSocket front end for the Vision Assist frame pipeline.
//!
//! Serves `GET /ws` (the frame protocol) and `GET /health`. All frame
//! handling lives in `vision-assist-core`; this crate only adapts axum's
//! WebSocket to [`vision_assist_core::FrameTransport`] and owns the server
//! lifecycle.

pub mod handler;
pub mod server;
pub mod transport;

pub use server::{start_server, AppState, ServerHandle};
pub use transport::WsTransport;
