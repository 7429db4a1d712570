use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::frame::Frame;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Serializes a frame for upload.
pub trait FrameEncoder: Send {
    /// MIME type of the encoded bytes.
    fn content_type(&self) -> &'static str;

    fn encode(&self, frame: &Frame) -> Result<Vec<u8>>;
}

/// In-memory JPEG encoding.
#[derive(Clone, Copy, Debug)]
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn content_type(&self) -> &'static str {
        "image/jpeg"
    }

    fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(frame.byte_len() / 8);
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode(
                frame.pixels(),
                frame.width(),
                frame.height(),
                ExtendedColorType::Rgb8,
            )
            .with_context(|| format!("jpeg encode {}x{}", frame.width(), frame.height()))?;
        Ok(out)
    }
}
