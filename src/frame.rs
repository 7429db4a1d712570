//! Captured frames and display geometry.
//!
//! - `Frame`: Owned RGB pixel buffer. Immutable after construction.
//! - `InferenceBox`: Region of the inference input that holds scaled source pixels.
//! - `DisplayTransform`: Maps inference-space keypoints into display space.
//! - `Resolution`: Capture presets and the inference input size each one feeds.
//!
//! Every geometric comparison in the fall detector and every point drawn on the
//! overlay goes through the same `DisplayTransform`, so both share one frame.

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Interleaved RGB.
pub const CHANNELS: usize = 3;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// Captured RGB frame.
///
/// There is no mutable pixel accessor. A stage that needs to keep a frame
/// beyond its handoff either takes ownership or makes an explicit `clone()`.
#[derive(Clone)]
pub struct Frame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    captured_at: Instant,
}

impl Frame {
    /// Wrap a tightly packed RGB buffer captured now.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        Self::captured(pixels, width, height, Instant::now())
    }

    /// Wrap a tightly packed RGB buffer with an explicit capture instant.
    pub fn captured(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        captured_at: Instant,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero ({}x{})", width, height));
        }
        let expected = packed_len(width, height);
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{} RGB",
                pixels.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            captured_at,
        })
    }

    /// Copy rows out of a buffer whose lines carry trailing padding.
    ///
    /// `stride` is the length of one line in bytes, padding included.
    pub fn from_strided(data: &[u8], width: u32, height: u32, stride: usize) -> Result<Self> {
        if width == 0 || height == 0 || stride == 0 {
            return Err(anyhow!(
                "strided frame needs non-zero dimensions and stride ({}x{}, stride {})",
                width,
                height,
                stride
            ));
        }
        let row = width as usize * CHANNELS;
        if stride < row {
            return Err(anyhow!("stride {} shorter than row of {} bytes", stride, row));
        }
        let needed = stride * (height as usize).saturating_sub(1) + row;
        if data.len() < needed {
            return Err(anyhow!(
                "strided buffer is {} bytes, need at least {}",
                data.len(),
                needed
            ));
        }
        let mut pixels = Vec::with_capacity(packed_len(width, height));
        for line in data.chunks(stride).take(height as usize) {
            pixels.extend_from_slice(&line[..row]);
        }
        Self::new(pixels, width, height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Packed RGB pixels, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Flattened input tensor for the inference engine.
    pub fn input_tensor(&self) -> &[u8] {
        &self.pixels
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// Short content digest used to correlate log lines for one frame.
    pub fn digest_hex(&self) -> String {
        let digest = Sha256::digest(&self.pixels);
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

fn packed_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * CHANNELS
}

// ----------------------------------------------------------------------------
// Geometry
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Crop/letterbox geometry `(x, y, width, height)` in inference-input pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InferenceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl InferenceBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Result<Self> {
        if !(width > 0.0 && height > 0.0) {
            return Err(anyhow!(
                "inference box must have positive size, got {}x{}",
                width,
                height
            ));
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Box covering the whole inference input.
    pub fn full(size: FrameSize) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: size.width as f32,
            height: size.height as f32,
        }
    }

    /// Box produced by scaling `source` to fit `inference` and padding the rest
    /// symmetrically.
    pub fn letterbox(source: FrameSize, inference: FrameSize) -> Result<Self> {
        if source.width == 0 || source.height == 0 {
            return Err(anyhow!("source size must be non-zero, got {}", source));
        }
        // Integer cross-multiplication keeps exact fits exact.
        let (src_w, src_h) = (source.width as u64, source.height as u64);
        let (inf_w, inf_h) = (inference.width as u64, inference.height as u64);
        let (scaled_w, scaled_h) = if inf_w * src_h <= inf_h * src_w {
            (inf_w, src_h * inf_w / src_w)
        } else {
            (src_w * inf_h / src_h, inf_h)
        };
        let (scaled_w, scaled_h) = (scaled_w as u32, scaled_h as u32);
        let pad_left = inference.width.saturating_sub(scaled_w) / 2;
        let pad_top = inference.height.saturating_sub(scaled_h) / 2;
        Self::new(
            pad_left as f32,
            pad_top as f32,
            scaled_w as f32,
            scaled_h as f32,
        )
    }
}

/// Inference-space to display-space mapping, `(p - box.origin) * display / box`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayTransform {
    offset_x: f32,
    offset_y: f32,
    scale_x: f32,
    scale_y: f32,
}

impl DisplayTransform {
    pub fn new(display: FrameSize, inference_box: InferenceBox) -> Self {
        Self {
            offset_x: inference_box.x,
            offset_y: inference_box.y,
            scale_x: display.width as f32 / inference_box.width,
            scale_y: display.height as f32 / inference_box.height,
        }
    }

    pub fn identity() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    pub fn map_x(&self, x: f32) -> f32 {
        (x - self.offset_x) * self.scale_x
    }

    pub fn map_y(&self, y: f32) -> f32 {
        (y - self.offset_y) * self.scale_y
    }

    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        (self.map_x(x), self.map_y(y))
    }
}

// ----------------------------------------------------------------------------
// Resolution presets
// ----------------------------------------------------------------------------

/// Capture presets. Each maps to a display (source) size, the size frames are
/// delivered at, and the inference input size of the matching model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Resolution {
    R480x360,
    #[default]
    R640x480,
    R1280x720,
}

impl Resolution {
    pub fn source_size(&self) -> FrameSize {
        match self {
            Resolution::R480x360 | Resolution::R640x480 => FrameSize::new(640, 480),
            Resolution::R1280x720 => FrameSize::new(1280, 720),
        }
    }

    pub fn sink_size(&self) -> FrameSize {
        match self {
            Resolution::R480x360 => FrameSize::new(480, 360),
            Resolution::R640x480 => FrameSize::new(640, 480),
            Resolution::R1280x720 => FrameSize::new(1280, 720),
        }
    }

    pub fn inference_size(&self) -> FrameSize {
        match self {
            Resolution::R480x360 => FrameSize::new(481, 353),
            Resolution::R640x480 => FrameSize::new(641, 481),
            Resolution::R1280x720 => FrameSize::new(1281, 721),
        }
    }

    /// Letterbox geometry for frames delivered at `inference_size()`.
    pub fn inference_box(&self) -> Result<InferenceBox> {
        InferenceBox::letterbox(self.source_size(), self.inference_size())
    }
}

impl FromStr for Resolution {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "480x360" => Ok(Resolution::R480x360),
            "640x480" => Ok(Resolution::R640x480),
            "1280x720" => Ok(Resolution::R1280x720),
            other => Err(anyhow!(
                "unsupported resolution '{}'; expected 480x360, 640x480 or 1280x720",
                other
            )),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sink_size())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
