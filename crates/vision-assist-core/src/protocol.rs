//! Wire envelopes.
//!
//! Clients send JSON text messages:
//!
//! ```text
//! { "type": "frame" | "image", "data": "data:<mime>;base64,<payload>", "timestamp": <ms, optional> }
//! ```
//!
//! and receive either
//!
//! ```text
//! { "type": "success", "data": [ <instruction>, ... ] }
//! { "type": "error", "message": "<human-readable>", "kind": "decode" | "encode" | "inference" }
//! ```
//!
//! or nothing at all for frames the rate governor dropped.

use crate::config::PipelineConfig;
use crate::detector::Instruction;
use crate::error::ErrorKind;
use crate::{Result, VisionError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Loose view of an inbound message; field types are checked after parsing
/// so that a wrong-typed field never hides the envelope type.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type", default)]
    kind: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    timestamp: Option<Value>,
}

/// A parsed inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A `frame` or `image` envelope.
    Frame(FrameMessage),
    /// Valid JSON with any other (or no) `type`; ignored by the pipeline.
    Unrecognized(Option<String>),
}

/// Payload of a frame envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMessage {
    /// The data URI, if the envelope carried a string `data` field.
    pub data: Option<String>,
    /// Client clock in ms since epoch. Advisory only.
    pub timestamp: Option<i64>,
}

impl FrameMessage {
    /// The data URI to decode.
    pub fn data_uri(&self) -> Result<&str> {
        self.data.as_deref().ok_or_else(|| VisionError::Decode {
            message: "frame envelope has no string 'data' field".to_string(),
        })
    }
}

impl Inbound {
    /// Parse one text message.
    ///
    /// Fails with [`VisionError::Protocol`] on malformed JSON or a non-object
    /// message.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).map_err(|e| VisionError::Protocol {
            message: format!("invalid JSON: {}", e),
        })?;
        if !value.is_object() {
            return Err(VisionError::Protocol {
                message: "envelope is not a JSON object".to_string(),
            });
        }
        let raw: RawEnvelope = serde_json::from_value(value).map_err(|e| VisionError::Protocol {
            message: format!("invalid envelope: {}", e),
        })?;

        let kind = raw.kind.as_ref().and_then(Value::as_str);
        match kind {
            Some(k) if PipelineConfig::FRAME_TYPES.contains(&k) => {
                Ok(Inbound::Frame(FrameMessage {
                    data: raw.data.as_ref().and_then(Value::as_str).map(str::to_string),
                    timestamp: raw.timestamp.as_ref().and_then(Value::as_i64),
                }))
            }
            other => Ok(Inbound::Unrecognized(other.map(str::to_string))),
        }
    }
}

/// A message sent back to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Success {
        data: Vec<Instruction>,
        #[serde(skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
    Error {
        message: String,
        kind: ErrorKind,
    },
}

impl Outbound {
    pub fn success(instructions: Vec<Instruction>, image: Option<String>) -> Self {
        Outbound::Success {
            data: instructions,
            image,
        }
    }

    /// Build the `error` envelope for a per-frame failure.
    pub fn from_error(err: &VisionError) -> Self {
        Outbound::Error {
            message: err.to_string(),
            kind: err.kind(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outbound::Success { .. })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
