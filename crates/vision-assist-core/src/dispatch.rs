//! Inference dispatch onto the blocking pool.
//!
//! Model calls are CPU/GPU bound and block. Each one runs as a
//! `spawn_blocking` task while the calling connection loop awaits the handle,
//! so the async worker threads keep serving every other connection's I/O.

use crate::codec::{self, DecodedFrame};
use crate::config::PipelineConfig;
use crate::detector::{Detector, Instruction};
use crate::registry::ConnectionId;
use crate::storage::FrameStore;
use crate::{Result, VisionError};
use chrono::Local;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of one successful dispatch.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub instructions: Vec<Instruction>,
    /// Annotated frame as a data URI, when echo is enabled.
    pub echo: Option<String>,
    /// Time spent inside the detector.
    pub inference_time: Duration,
}

/// Runs detector calls (and the follow-up storage/echo work) on worker threads.
#[derive(Clone)]
pub struct InferenceDispatcher {
    detector: Arc<dyn Detector>,
    store: Option<Arc<dyn FrameStore>>,
    echo_frames: bool,
}

impl InferenceDispatcher {
    pub fn new(detector: Arc<dyn Detector>) -> Self {
        Self {
            detector,
            store: None,
            echo_frames: false,
        }
    }

    /// Store every annotated frame through `store`.
    pub fn with_store(mut self, store: Arc<dyn FrameStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Echo every annotated frame back to the client.
    pub fn with_echo(mut self, echo_frames: bool) -> Self {
        self.echo_frames = echo_frames;
        self
    }

    /// Run inference for one frame.
    ///
    /// Detector errors, a panicking detector and echo encoding failures all
    /// come back as errors for this frame only. Storage failures are logged
    /// and do not fail the frame.
    pub async fn dispatch(
        &self,
        frame: DecodedFrame,
        connection: ConnectionId,
    ) -> Result<DispatchOutcome> {
        let detector = Arc::clone(&self.detector);
        let store = self.store.clone();
        let echo_frames = self.echo_frames;
        let captured_at = Local::now();

        let task = tokio::task::spawn_blocking(move || -> Result<DispatchOutcome> {
            let sequence = frame.sequence;
            let started = Instant::now();
            let detection = detector.infer(frame.buffer)?;
            let inference_time = started.elapsed();

            if let Some(store) = &store {
                if let Err(e) = store.store(&detection.annotated, connection, sequence, captured_at) {
                    warn!("Failed to store frame {} of {}: {}", sequence, connection, e);
                }
            }

            let echo = if echo_frames {
                Some(codec::encode_data_uri(
                    &detection.annotated,
                    PipelineConfig::OUTPUT_FORMAT,
                )?)
            } else {
                None
            };

            Ok(DispatchOutcome {
                instructions: detection.instructions,
                echo,
                inference_time,
            })
        });

        let outcome = match task.await {
            Ok(result) => result,
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    "detector panicked while processing frame"
                } else {
                    "inference task was cancelled"
                };
                Err(VisionError::inference(message, join_err))
            }
        }?;

        debug!(
            "Frame for {} processed in {:.3} seconds",
            connection,
            outcome.inference_time.as_secs_f64()
        );
        Ok(outcome)
    }
}
