//! Detector contract consumed by the pipeline.
//!
//! The vision model itself lives outside this crate. The pipeline only needs
//! something that turns a pixel buffer into an annotated buffer plus an ordered
//! list of instructions. Calls are treated as slow and blocking; the pipeline
//! always runs them on the blocking pool (see [`crate::dispatch`]).

use crate::codec::PixelBuffer;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;

/// One detector-defined guidance unit, forwarded to the client verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instruction(Value);

impl Instruction {
    pub fn new(value: Value) -> Self {
        Self(value)
    }
}

impl From<Value> for Instruction {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Output of a single inference call.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Frame with the detector's overlays drawn on it.
    pub annotated: PixelBuffer,
    /// Instructions in the order the detector produced them.
    pub instructions: Vec<Instruction>,
}

/// A detector that can be invoked from several worker threads at once.
pub trait Detector: Send + Sync + 'static {
    fn infer(&self, frame: PixelBuffer) -> Result<Detection>;
}

/// A detector that needs exclusive access for each call.
///
/// Wrap it in [`SerializedDetector`] to share it between connections.
pub trait DetectorMut: Send + 'static {
    fn infer(&mut self, frame: PixelBuffer) -> Result<Detection>;
}

/// Serializes calls into a [`DetectorMut`] behind a mutex.
///
/// Only one frame is in the model at a time, across all connections. A slow
/// frame on one connection therefore delays inference (not admission or I/O)
/// on the others.
pub struct SerializedDetector<D> {
    inner: Mutex<D>,
}

impl<D: DetectorMut> SerializedDetector<D> {
    pub fn new(detector: D) -> Self {
        Self {
            inner: Mutex::new(detector),
        }
    }
}

impl<D: DetectorMut> Detector for SerializedDetector<D> {
    fn infer(&self, frame: PixelBuffer) -> Result<Detection> {
        // A panic in an earlier call already failed that frame; later frames
        // still get the detector.
        let mut detector = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        detector.infer(frame)
    }
}

/// Returns every frame unchanged with no instructions.
///
/// Lets the server run end to end without a model attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDetector;

impl Detector for PassthroughDetector {
    fn infer(&self, frame: PixelBuffer) -> Result<Detection> {
        Ok(Detection {
            annotated: frame,
            instructions: Vec::new(),
        })
    }
}
