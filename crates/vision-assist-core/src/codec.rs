//! Image codec adapter.
//!
//! Converts between the transport encoding (`data:<mime>;base64,<payload>`)
//! and an in-memory RGB pixel buffer. Every function here is pure and can be
//! called from any thread.

use crate::config::PipelineConfig;
use crate::{Result, VisionError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;

/// Decoded 8-bit RGB pixel buffer.
pub type PixelBuffer = RgbImage;

/// A decoded frame tagged with the sequence number of its connection.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub buffer: PixelBuffer,
    pub sequence: u64,
}

/// Split a data URI into its header and base64 payload on the first `,`.
pub fn split_data_uri(data: &str) -> Result<(&str, &str)> {
    data.split_once(PipelineConfig::DATA_URI_SEPARATOR)
        .ok_or_else(|| VisionError::Decode {
            message: "data URI has no ',' separating header from payload".to_string(),
        })
}

/// Decode a `data:<mime>;base64,<payload>` string into a pixel buffer.
///
/// The header is not inspected; the image format is sniffed from the bytes.
pub fn decode_data_uri(data: &str) -> Result<PixelBuffer> {
    let (_header, payload) = split_data_uri(data)?;
    let bytes = STANDARD.decode(payload.trim())?;
    decode(&bytes)
}

/// Decode encoded image bytes (JPEG, PNG, ...) into a pixel buffer.
pub fn decode(bytes: &[u8]) -> Result<PixelBuffer> {
    if bytes.is_empty() {
        return Err(VisionError::Decode {
            message: "empty image payload".to_string(),
        });
    }
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| VisionError::Decode {
            message: format!("unreadable image data: {}", e),
        })
}

/// Encode a pixel buffer into the given image format.
pub fn encode(buffer: &PixelBuffer, format: ImageFormat) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    buffer
        .write_to(&mut out, format)
        .map_err(|e| VisionError::Encode {
            message: format!("{:?} encoding failed: {}", format, e),
        })?;
    Ok(out.into_inner())
}

/// Encode a pixel buffer as a `data:` URI suitable for the wire.
pub fn encode_data_uri(buffer: &PixelBuffer, format: ImageFormat) -> Result<String> {
    let bytes = encode(buffer, format)?;
    Ok(format!(
        "data:{};base64,{}",
        format.to_mime_type(),
        STANDARD.encode(bytes)
    ))
}
