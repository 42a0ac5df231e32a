//! Per-connection message loop.
//!
//! One loop runs per connection and handles its messages strictly one at a
//! time: a frame is admitted, decoded, inferred and answered before the next
//! message is read. That alone keeps responses in frame order. Loops for
//! different connections run as independent tasks and only share the
//! registry and the detector.

use crate::codec::{self, DecodedFrame};
use crate::config::PipelineSettings;
use crate::detector::Detector;
use crate::dispatch::{DispatchOutcome, InferenceDispatcher};
use crate::governor::RateGovernor;
use crate::protocol::{FrameMessage, Inbound, Outbound};
use crate::registry::{Connection, ConnectionId, ConnectionRegistry};
use crate::storage::DirectoryStore;
use crate::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

/// A bidirectional text-message channel to one client.
///
/// Owned exclusively by that client's loop.
#[async_trait::async_trait]
pub trait FrameTransport: Send {
    /// Wait for the next text message. `Ok(None)` means the peer closed.
    async fn recv_text(&mut self) -> Result<Option<String>>;

    /// Send one text message.
    async fn send_text(&mut self, text: String) -> Result<()>;
}

/// Everything a connection loop needs, shared by all connections.
pub struct Pipeline {
    governor: RateGovernor,
    dispatcher: InferenceDispatcher,
    registry: Arc<ConnectionRegistry>,
}

impl Pipeline {
    /// Build a pipeline around `detector`.
    ///
    /// Creates the frame directory when `settings.frames_dir` is set.
    pub fn new(
        detector: Arc<dyn Detector>,
        registry: Arc<ConnectionRegistry>,
        settings: PipelineSettings,
    ) -> Result<Self> {
        settings.validate()?;

        let mut dispatcher = InferenceDispatcher::new(detector).with_echo(settings.echo_frames);
        if let Some(dir) = &settings.frames_dir {
            dispatcher = dispatcher.with_store(Arc::new(DirectoryStore::new(dir)?));
        }

        Ok(Self {
            governor: RateGovernor::new(settings.min_frame_interval),
            dispatcher,
            registry,
        })
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Serve one connection until the peer closes, the transport fails or
    /// `shutdown` flips to `true`.
    ///
    /// The connection is registered before the first read and deregistered on
    /// every exit path. A transport read failure is returned; a failed send is
    /// treated as a disconnect.
    pub async fn run_connection<T: FrameTransport>(
        &self,
        mut transport: T,
        peer: Option<SocketAddr>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut connection = Connection::new(ConnectionId::new(), peer, Instant::now());
        let guard = self.registry.register(&connection);
        let id = connection.id();

        if *shutdown.borrow() {
            return Ok(());
        }

        loop {
            let text = tokio::select! {
                result = transport.recv_text() => match result? {
                    Some(text) => text,
                    None => return Ok(()),
                },
                _ = shutdown.changed() => return Ok(()),
            };

            let response = tokio::select! {
                response = self.handle_message(&mut connection, &text) => response,
                _ = shutdown.changed() => return Ok(()),
            };
            let Some(response) = response else {
                continue;
            };

            // The connection may have been dropped from the registry (server
            // shutdown) while its frame was in the model.
            if !guard.is_live() {
                debug!("Discarding response for deregistered connection {}", id);
                return Ok(());
            }

            let payload = match response.to_json() {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to serialize response for {}: {}", id, e);
                    continue;
                }
            };
            if let Err(e) = transport.send_text(payload).await {
                debug!("Connection {} went away before its response was sent: {}", id, e);
                return Ok(());
            }
        }
    }

    /// Handle one inbound text message and return the response to send, if any.
    ///
    /// Malformed JSON, unknown envelope types and rate-limited frames yield
    /// `None`. Every other outcome, including failures, yields an envelope.
    pub async fn handle_message(
        &self,
        connection: &mut Connection,
        text: &str,
    ) -> Option<Outbound> {
        let message = match Inbound::parse(text) {
            Ok(Inbound::Frame(message)) => message,
            Ok(Inbound::Unrecognized(kind)) => {
                debug!("Ignoring envelope of type {:?} from {}", kind, connection.id());
                return None;
            }
            Err(e) => {
                warn!("Invalid JSON received from {}: {}", connection.id(), e);
                return None;
            }
        };

        if !self.governor.admit(connection, Instant::now()) {
            trace!("Rate limited frame from {}", connection.id());
            return None;
        }

        match self.process_frame(connection, &message).await {
            Ok(outcome) => {
                connection.record_processed();
                Some(Outbound::success(outcome.instructions, outcome.echo))
            }
            Err(e) => {
                warn!("Error processing frame from {}: {}", connection.id(), e);
                Some(Outbound::from_error(&e))
            }
        }
    }

    async fn process_frame(
        &self,
        connection: &Connection,
        message: &FrameMessage,
    ) -> Result<DispatchOutcome> {
        let buffer = codec::decode_data_uri(message.data_uri()?)?;
        let frame = DecodedFrame {
            buffer,
            sequence: connection.frame_sequence(),
        };
        self.dispatcher.dispatch(frame, connection.id()).await
    }
}
