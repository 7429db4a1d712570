//! Threaded frame pipeline.
//!
//! ```text
//! feed ──publish──▶ [capture slot] ──▶ inference thread ──▶ [result slot] ──▶ render thread
//!                                                                                 │
//!                                                            overlay sink ◀───────┤
//!                                                            upload queue ◀───────┘ (on alert)
//! ```
//!
//! Both slots overwrite: a stage that falls behind sees only the freshest
//! item. Ordering is preserved for the frames that survive. Each slot and the
//! upload queue have their own lock and no thread holds two at once.
//!
//! An inference engine error is fatal. The inference thread closes both slots,
//! the render thread drains out, and `Pipeline::shutdown` returns the error.

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::fall::FallConfig;
use crate::frame::{Frame, FrameSize, InferenceBox, Resolution};
use crate::inference::{InferenceResult, PoseEngine};
use crate::render::{OverlaySink, RenderStage};
use crate::slot::SyncSlot;
use crate::upload::{UploadQueue, UploadStats};

/// Inference output travelling to the render thread with its frame.
pub struct InferenceOutput {
    pub result: InferenceResult,
    pub frame: Frame,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Size overlays are drawn at.
    pub display: FrameSize,
    /// Where source pixels sit inside the inference input.
    pub inference_box: InferenceBox,
    pub fall: FallConfig,
}

impl PipelineConfig {
    pub fn for_resolution(resolution: Resolution, fall: FallConfig) -> Result<Self> {
        Ok(Self {
            display: resolution.source_size(),
            inference_box: resolution.inference_box()?,
            fall,
        })
    }
}

#[derive(Debug, Default)]
struct PipelineCounters {
    published: AtomicU64,
    inferred: AtomicU64,
    rendered: AtomicU64,
    alerts: AtomicU64,
}

/// Point-in-time pipeline counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub published: u64,
    /// Frames overwritten in the capture slot before inference took them.
    pub capture_replaced: u64,
    pub inferred: u64,
    /// Results overwritten before the render thread took them.
    pub result_replaced: u64,
    pub rendered: u64,
    pub alerts: u64,
    pub uploads: UploadStats,
}

/// Producer handle for the capture side. Cheap to clone.
#[derive(Clone)]
pub struct FrameFeedHandle {
    slot: Arc<SyncSlot<Frame>>,
    counters: Arc<PipelineCounters>,
}

impl FrameFeedHandle {
    /// Hand a frame to the inference thread. Returns false once the pipeline
    /// has stopped.
    pub fn publish(&self, frame: Frame) -> bool {
        let accepted = self.slot.publish(frame);
        if accepted {
            self.counters.published.fetch_add(1, Ordering::Relaxed);
        }
        accepted
    }
}

pub struct Pipeline {
    capture: Arc<SyncSlot<Frame>>,
    results: Arc<SyncSlot<InferenceOutput>>,
    counters: Arc<PipelineCounters>,
    uploads: Option<UploadQueue>,
    inference: Option<JoinHandle<Result<()>>>,
    render: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Spawn the inference and render threads.
    ///
    /// `uploads` is optional; without it alerts are still rendered but no
    /// evidence leaves the process.
    pub fn start<E, S>(
        config: PipelineConfig,
        mut engine: E,
        sink: S,
        uploads: Option<UploadQueue>,
    ) -> Result<Self>
    where
        E: PoseEngine + 'static,
        S: OverlaySink + 'static,
    {
        engine
            .warm_up()
            .with_context(|| format!("warm up inference engine '{}'", engine.name()))?;

        let capture = Arc::new(SyncSlot::new());
        let results = Arc::new(SyncSlot::new());
        let counters = Arc::new(PipelineCounters::default());
        let stage = RenderStage::new(
            config.display,
            config.inference_box,
            config.fall,
            uploads.as_ref().map(UploadQueue::sender),
        );

        let inference = {
            let capture = capture.clone();
            let results = results.clone();
            let counters = counters.clone();
            std::thread::Builder::new()
                .name("inference".to_string())
                .spawn(move || {
                    let outcome = run_inference(&mut engine, &capture, &results, &counters);
                    if let Err(err) = &outcome {
                        log::error!("inference stage stopped: {:#}", err);
                        capture.close();
                        results.close();
                    }
                    outcome
                })?
        };

        let render = {
            let results = results.clone();
            let counters = counters.clone();
            std::thread::Builder::new()
                .name("render".to_string())
                .spawn(move || run_render(stage, sink, &results, &counters))?
        };

        log::info!(
            "pipeline started: display={} inference_box=({}, {}, {}, {}) threshold={:.1}px cooldown={:.1}s",
            config.display,
            config.inference_box.x,
            config.inference_box.y,
            config.inference_box.width,
            config.inference_box.height,
            config.fall.threshold,
            config.fall.cooldown.as_secs_f64()
        );

        Ok(Self {
            capture,
            results,
            counters,
            uploads,
            inference: Some(inference),
            render: Some(render),
        })
    }

    pub fn feed(&self) -> FrameFeedHandle {
        FrameFeedHandle {
            slot: self.capture.clone(),
            counters: self.counters.clone(),
        }
    }

    /// False once shutdown started or the inference stage failed.
    pub fn is_running(&self) -> bool {
        !self.capture.is_closed()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            published: self.counters.published.load(Ordering::Relaxed),
            capture_replaced: self.capture.replaced(),
            inferred: self.counters.inferred.load(Ordering::Relaxed),
            result_replaced: self.results.replaced(),
            rendered: self.counters.rendered.load(Ordering::Acquire),
            alerts: self.counters.alerts.load(Ordering::Relaxed),
            uploads: self
                .uploads
                .as_ref()
                .map(UploadQueue::stats)
                .unwrap_or_default(),
        }
    }

    /// Close both slots, join the stage threads and stop the upload worker.
    ///
    /// Work in flight on each thread completes first. Returns the inference
    /// error if the engine failed.
    pub fn shutdown(mut self) -> Result<()> {
        self.capture.close();
        self.results.close();

        let inference = match self.inference.take() {
            Some(join) => join
                .join()
                .map_err(|_| anyhow!("inference thread panicked"))
                .and_then(|outcome| outcome),
            None => Ok(()),
        };
        let render = match self.render.take() {
            Some(join) => join.join().map_err(|_| anyhow!("render thread panicked")),
            None => Ok(()),
        };
        let uploads = match self.uploads.take() {
            Some(queue) => queue.stop(),
            None => Ok(()),
        };

        inference?;
        render?;
        uploads?;
        log::info!("pipeline stopped");
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.capture.close();
        self.results.close();
    }
}

fn run_inference(
    engine: &mut dyn PoseEngine,
    input: &SyncSlot<Frame>,
    output: &SyncSlot<InferenceOutput>,
    counters: &PipelineCounters,
) -> Result<()> {
    let input_size = engine.input_size();
    log::debug!("inference stage running engine '{}' at {}", engine.name(), input_size);
    while let Some(frame) = input.take_blocking() {
        let result = engine
            .infer(&frame)
            .with_context(|| format!("inference engine '{}' failed", engine.name()))?;
        counters.inferred.fetch_add(1, Ordering::Relaxed);
        output.publish(InferenceOutput { result, frame });
    }
    Ok(())
}

fn run_render<S: OverlaySink>(
    mut stage: RenderStage,
    mut sink: S,
    input: &SyncSlot<InferenceOutput>,
    counters: &PipelineCounters,
) {
    while let Some(InferenceOutput { result, frame }) = input.take_blocking() {
        let output = stage.process(result, frame, Instant::now());
        if let Err(err) = sink.present(&output.overlay, output.freeze) {
            log::warn!("overlay sink rejected frame: {:#}", err);
        }
        if output.evaluation.alert {
            counters.alerts.fetch_add(1, Ordering::Relaxed);
        }
        counters.rendered.fetch_add(1, Ordering::Release);
    }
    log::debug!(
        "render stage stopped after {} frames (mean inference {:.1}ms)",
        stage.latency().frames(),
        stage.latency().mean_ms()
    );
}
