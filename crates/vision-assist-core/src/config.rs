//! Centralized configuration for Vision Assist.
//!
//! Constants for the frame pipeline and the server, plus [`PipelineSettings`],
//! the runtime knobs the binary fills in from its command line.

use crate::{Result, VisionError};
use image::ImageFormat;
use std::path::PathBuf;
use std::time::Duration;

/// Frame pipeline configuration.
pub struct PipelineConfig;

impl PipelineConfig {
    /// Minimum gap between two admitted frames on one connection (20 fps ceiling).
    pub const DEFAULT_MIN_FRAME_INTERVAL: Duration = Duration::from_millis(50);
    /// Upper bound accepted for a configured interval.
    pub const MAX_MIN_FRAME_INTERVAL: Duration = Duration::from_secs(10);
    /// Envelope types that carry a frame.
    pub const FRAME_TYPES: [&'static str; 2] = ["frame", "image"];
    /// Separator between the data URI header and its payload.
    pub const DATA_URI_SEPARATOR: char = ',';
    /// Format used when annotated frames are stored or echoed.
    pub const OUTPUT_FORMAT: ImageFormat = ImageFormat::Jpeg;
    pub const STORED_FRAME_PREFIX: &'static str = "frame";
    pub const STORED_FRAME_TIMESTAMP: &'static str = "%Y%m%d_%H%M%S_%6f";
}

/// Server configuration.
pub struct ServerConfig;

impl ServerConfig {
    pub const DEFAULT_HOST: &'static str = "0.0.0.0";
    pub const DEFAULT_PORT: u16 = 8000;
    pub const WS_PATH: &'static str = "/ws";
    pub const HEALTH_PATH: &'static str = "/health";
    pub const DEFAULT_FRAMES_DIR_NAME: &'static str = "stream_frames";
}

/// Runtime settings for a [`crate::Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Minimum gap between admitted frames on one connection.
    pub min_frame_interval: Duration,
    /// Echo the annotated frame back inside each success envelope.
    pub echo_frames: bool,
    /// Directory that receives every annotated frame, if any.
    pub frames_dir: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_frame_interval: PipelineConfig::DEFAULT_MIN_FRAME_INTERVAL,
            echo_frames: false,
            frames_dir: None,
        }
    }
}

impl PipelineSettings {
    /// Reject settings the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.min_frame_interval > PipelineConfig::MAX_MIN_FRAME_INTERVAL {
            return Err(VisionError::Config {
                message: format!(
                    "min frame interval {:?} exceeds maximum {:?}",
                    self.min_frame_interval,
                    PipelineConfig::MAX_MIN_FRAME_INTERVAL
                ),
            });
        }
        if let Some(dir) = &self.frames_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(VisionError::Config {
                    message: format!("frames dir is not a directory: {}", dir.display()),
                });
            }
        }
        Ok(())
    }
}
