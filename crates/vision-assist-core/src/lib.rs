//! Vision Assist Core - frame ingestion and rate-governed inference dispatch.
//!
//! This crate holds everything between a connected client and the vision model:
//! the wire envelopes, the per-connection admission policy, the connection
//! registry, the image codec adapter and the blocking-pool dispatcher that keeps
//! a slow model from stalling other connections. It has no HTTP dependency; the
//! `vision-assist-server` crate plugs a WebSocket into [`session::FrameTransport`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vision_assist_core::{ConnectionRegistry, Pipeline, PipelineSettings};
//!
//! let registry = Arc::new(ConnectionRegistry::new());
//! let pipeline = Pipeline::new(Arc::new(my_detector), registry, PipelineSettings::default())?;
//!
//! // For each accepted transport:
//! pipeline.run_connection(transport, Some(peer_addr), shutdown_rx).await;
//! ```

pub mod codec;
pub mod config;
pub mod detector;
pub mod dispatch;
pub mod error;
pub mod governor;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod storage;

pub use codec::{DecodedFrame, PixelBuffer};
pub use config::{PipelineConfig, PipelineSettings};
pub use detector::{Detection, Detector, DetectorMut, Instruction, PassthroughDetector, SerializedDetector};
pub use dispatch::InferenceDispatcher;
pub use error::{ErrorKind, Result, VisionError};
pub use governor::RateGovernor;
pub use protocol::{FrameMessage, Inbound, Outbound};
pub use registry::{Connection, ConnectionGuard, ConnectionId, ConnectionRegistry};
pub use session::{FrameTransport, Pipeline};
pub use storage::{DirectoryStore, FrameStore};
