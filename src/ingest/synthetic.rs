//! Synthetic frame source for `stub://` URLs.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use crate::frame::{Frame, FrameSize, CHANNELS};

pub const STUB_SCHEME: &str = "stub://";

#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Source URL. Only `stub://...` is accepted.
    pub url: String,
    /// Frames per second the caller should pace `next_frame` at.
    pub target_fps: u32,
    pub size: FrameSize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            target_fps: 10,
            size: FrameSize::new(640, 480),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedStats {
    pub frames_captured: u64,
    pub url: String,
}

/// Generates RGB frames with a slowly moving gradient.
pub struct SyntheticFeed {
    config: FeedConfig,
    frame_count: u64,
}

impl SyntheticFeed {
    pub fn new(config: FeedConfig) -> Result<Self> {
        if !config.url.starts_with(STUB_SCHEME) {
            return Err(anyhow!(
                "unsupported feed url '{}'; only {} sources are built in",
                config.url,
                STUB_SCHEME
            ));
        }
        if config.target_fps == 0 {
            return Err(anyhow!("feed target_fps must be greater than zero"));
        }
        if config.size.width == 0 || config.size.height == 0 {
            return Err(anyhow!("feed size must be non-zero, got {}", config.size));
        }
        log::info!(
            "feed: {} at {} fps ({}, synthetic)",
            config.url,
            config.target_fps,
            config.size
        );
        Ok(Self {
            config,
            frame_count: 0,
        })
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Pacing interval for `target_fps`.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.config.target_fps))
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        let FrameSize { width, height } = self.config.size;
        let row = width as usize * CHANNELS;
        let shift = self.frame_count;
        let mut pixels = vec![0u8; row * height as usize];
        for (y, line) in pixels.chunks_exact_mut(row).enumerate() {
            for (x, px) in line.chunks_exact_mut(CHANNELS).enumerate() {
                px[0] = ((x as u64 + shift) % 256) as u8;
                px[1] = ((y as u64 + shift / 2) % 256) as u8;
                px[2] = 96;
            }
        }
        Frame::captured(pixels, width, height, Instant::now())
    }

    pub fn stats(&self) -> FeedStats {
        FeedStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}
