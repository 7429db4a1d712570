//! Render stage: fall evaluation, overlay construction and evidence enqueue.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::fall::{FallConfig, FallDetector, FallEvaluation};
use crate::frame::{DisplayTransform, Frame, FrameSize, InferenceBox};
use crate::inference::InferenceResult;
use crate::overlay::{FpsCounter, Overlay, STATUS_FONT_SIZE};
use crate::upload::UploadSender;

/// Display path consumer of overlays.
pub trait OverlaySink: Send {
    /// `freeze` asks the display to hold its current video frame.
    fn present(&mut self, overlay: &Overlay, freeze: bool) -> Result<()>;
}

impl<S: OverlaySink + ?Sized> OverlaySink for Box<S> {
    fn present(&mut self, overlay: &Overlay, freeze: bool) -> Result<()> {
        (**self).present(overlay, freeze)
    }
}

/// Writes each overlay to one SVG file, replaced atomically.
pub struct SvgFileSink {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl SvgFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tmp_path = path.with_extension("svg.tmp");
        Self { path, tmp_path }
    }
}

impl OverlaySink for SvgFileSink {
    fn present(&mut self, overlay: &Overlay, _freeze: bool) -> Result<()> {
        std::fs::write(&self.tmp_path, overlay.to_svg())
            .with_context(|| format!("write overlay {}", self.tmp_path.display()))?;
        std::fs::rename(&self.tmp_path, &self.path)
            .with_context(|| format!("replace overlay {}", self.path.display()))?;
        Ok(())
    }
}

/// Logs overlays at debug level. Used when no display is attached.
#[derive(Default)]
pub struct LogOverlaySink;

impl OverlaySink for LogOverlaySink {
    fn present(&mut self, overlay: &Overlay, _freeze: bool) -> Result<()> {
        if let Some(status) = overlay.text.first() {
            log::debug!("overlay: {}", status.text);
        }
        Ok(())
    }
}

/// Running mean of engine latency.
#[derive(Clone, Copy, Debug, Default)]
pub struct LatencyStats {
    frames: u64,
    total_ms: f64,
}

impl LatencyStats {
    pub fn record(&mut self, latency: Duration) {
        self.frames += 1;
        self.total_ms += latency.as_secs_f64() * 1000.0;
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn mean_ms(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.total_ms / self.frames as f64
        }
    }

    /// Rate the engine alone could sustain.
    pub fn model_fps(&self) -> f64 {
        let mean = self.mean_ms();
        if mean > 0.0 {
            1000.0 / mean
        } else {
            0.0
        }
    }
}

#[derive(Clone, Debug)]
pub struct RenderOutput {
    pub overlay: Overlay,
    /// Always false in the default flow.
    pub freeze: bool,
    pub evaluation: FallEvaluation,
    /// Alert frame was accepted by the upload queue.
    pub enqueued: bool,
}

/// Per-frame render work. Owned by the render thread.
pub struct RenderStage {
    detector: FallDetector,
    transform: DisplayTransform,
    display: FrameSize,
    fps: FpsCounter,
    latency: LatencyStats,
    uploads: Option<UploadSender>,
}

impl RenderStage {
    pub fn new(
        display: FrameSize,
        inference_box: InferenceBox,
        fall: FallConfig,
        uploads: Option<UploadSender>,
    ) -> Self {
        Self {
            detector: FallDetector::new(fall),
            transform: DisplayTransform::new(display, inference_box),
            display,
            fps: FpsCounter::default(),
            latency: LatencyStats::default(),
            uploads,
        }
    }

    pub fn detector(&self) -> &FallDetector {
        &self.detector
    }

    pub fn latency(&self) -> &LatencyStats {
        &self.latency
    }

    /// Evaluate one inference result and build its overlay.
    ///
    /// On an emitted alert the frame moves into the upload queue. A full queue
    /// drops it; rendering never waits on uploads.
    pub fn process(&mut self, result: InferenceResult, frame: Frame, now: Instant) -> RenderOutput {
        self.latency.record(result.latency);
        let true_fps = self.fps.tick(now);

        let mut overlay = Overlay::new(self.display);
        overlay.push_text(
            10,
            20,
            format!(
                "PoseNet: {:.1}ms ({:.2} fps) TrueFPS: {:.2} Nposes {}",
                self.latency.mean_ms(),
                self.latency.model_fps(),
                true_fps,
                result.poses.len()
            ),
            STATUS_FONT_SIZE,
        );
        for pose in &result.poses {
            overlay.add_pose(pose, &self.transform);
        }

        let evaluation = self.detector.evaluate(&result.poses, &self.transform, now);
        let mut enqueued = false;
        if evaluation.alert {
            overlay.set_alert_banner();
            log::warn!(
                "fall detected: shoulder displacement {:.1}px over {} samples",
                evaluation.displacement.unwrap_or_default(),
                self.detector.history().capacity()
            );
            if let Some(uploads) = &self.uploads {
                enqueued = uploads.try_enqueue(frame);
            }
        }

        RenderOutput {
            overlay,
            freeze: false,
            evaluation,
            enqueued,
        }
    }
}
