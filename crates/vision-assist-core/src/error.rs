//! Error types for Vision Assist.
//!
//! Every failure on the frame path maps onto one of four classes, and the class
//! decides what the client sees:
//!
//! - **Protocol**: malformed JSON or an unusable envelope. Logged, never answered.
//! - **Decode / Encode**: bad data URI, base64 or image bytes. Answered with an
//!   `error` envelope; the connection stays open.
//! - **Inference**: any detector failure, including a panicking worker. Answered
//!   with an `error` envelope; the connection stays open.
//! - **Transport**: the socket itself failed. Ends that connection only.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Vision Assist.
#[derive(Debug, Error)]
pub enum VisionError {
    // Wire protocol errors
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // Codec errors
    #[error("Failed to decode frame: {message}")]
    Decode { message: String },

    #[error("Failed to encode frame: {message}")]
    Encode { message: String },

    // Detector errors
    #[error("Inference failed: {message}")]
    Inference {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Connection errors
    #[error("Transport error: {message}")]
    Transport { message: String },

    // Storage errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for Vision Assist operations.
pub type Result<T> = std::result::Result<T, VisionError>;

/// Error class reported to clients in the `kind` field of an `error` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Protocol,
    Decode,
    Encode,
    Inference,
    Transport,
}

impl From<std::io::Error> for VisionError {
    fn from(err: std::io::Error) -> Self {
        VisionError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for VisionError {
    fn from(err: serde_json::Error) -> Self {
        VisionError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<base64::DecodeError> for VisionError {
    fn from(err: base64::DecodeError) -> Self {
        VisionError::Decode {
            message: format!("invalid base64 payload: {}", err),
        }
    }
}

impl VisionError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        VisionError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create an inference error wrapping the detector's own error.
    pub fn inference(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        VisionError::Inference {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Map this error onto the class reported to clients.
    ///
    /// Anything that is not a protocol, codec or transport failure is reported
    /// as an inference failure: from the client's point of view the frame was
    /// admitted and could not be processed.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VisionError::Protocol { .. } | VisionError::Json { .. } => ErrorKind::Protocol,
            VisionError::Decode { .. } => ErrorKind::Decode,
            VisionError::Encode { .. } => ErrorKind::Encode,
            VisionError::Transport { .. } => ErrorKind::Transport,
            _ => ErrorKind::Inference,
        }
    }

    /// Check if this error should end the connection it occurred on.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, VisionError::Transport { .. })
    }
}
