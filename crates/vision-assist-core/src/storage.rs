//! Optional on-disk storage of processed frames.

use crate::codec::{self, PixelBuffer};
use crate::config::PipelineConfig;
use crate::registry::ConnectionId;
use crate::{Result, VisionError};
use chrono::{DateTime, Local};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Destination for annotated frames.
///
/// Called on a blocking worker thread right after inference.
pub trait FrameStore: Send + Sync + 'static {
    fn store(
        &self,
        frame: &PixelBuffer,
        connection: ConnectionId,
        sequence: u64,
        captured_at: DateTime<Local>,
    ) -> Result<PathBuf>;
}

/// Writes each frame as an image file in one directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
    format: ImageFormat,
}

impl DirectoryStore {
    /// Open (and create if needed) a frame directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| VisionError::io_with_path(e, &dir))?;
        Ok(Self {
            dir,
            format: PipelineConfig::OUTPUT_FORMAT,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a frame: `frame_<YYYYmmdd_HHMMSS_micros>_<seq:06>.<ext>`.
    pub fn file_name(&self, sequence: u64, captured_at: DateTime<Local>) -> String {
        let extension = self.format.extensions_str().first().copied().unwrap_or("img");
        format!(
            "{}_{}_{:06}.{}",
            PipelineConfig::STORED_FRAME_PREFIX,
            captured_at.format(PipelineConfig::STORED_FRAME_TIMESTAMP),
            sequence,
            extension
        )
    }
}

impl FrameStore for DirectoryStore {
    fn store(
        &self,
        frame: &PixelBuffer,
        connection: ConnectionId,
        sequence: u64,
        captured_at: DateTime<Local>,
    ) -> Result<PathBuf> {
        let bytes = codec::encode(frame, self.format)?;
        let path = self.dir.join(self.file_name(sequence, captured_at));
        std::fs::write(&path, bytes).map_err(|e| VisionError::io_with_path(e, &path))?;
        debug!("Stored frame {} of {} at {}", sequence, connection, path.display());
        Ok(path)
    }
}
