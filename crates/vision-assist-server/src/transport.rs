//! axum WebSocket adapter for the frame loop.

use axum::extract::ws::{Message, WebSocket};
use tracing::trace;
use vision_assist_core::{FrameTransport, Result, VisionError};

/// Text-message view of an axum [`WebSocket`].
///
/// Binary frames are ignored; pings are answered by axum itself.
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait::async_trait]
impl FrameTransport for WsTransport {
    async fn recv_text(&mut self) -> Result<Option<String>> {
        while let Some(message) = self.socket.recv().await {
            match message {
                Ok(Message::Text(text)) => return Ok(Some(text)),
                Ok(Message::Close(_)) => return Ok(None),
                Ok(Message::Binary(bytes)) => {
                    trace!("Ignoring {} byte binary message", bytes.len());
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => {
                    return Err(VisionError::Transport {
                        message: e.to_string(),
                    })
                }
            }
        }
        Ok(None)
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| VisionError::Transport {
                message: e.to_string(),
            })
    }
}
