//! Fall Sentinel
//!
//! Real-time fall detection over a camera feed. Pose keypoints come from an
//! inference engine; a sudden downward move of the shoulder midpoint raises an
//! alert, and the alert frame is offloaded to a remote server.
//!
//! # Architecture
//!
//! Three threads joined by single-slot handoffs:
//!
//! 1. **Capture** (caller): publishes frames into the capture `SyncSlot`.
//! 2. **Inference**: runs the `PoseEngine`, publishes results into the render slot.
//! 3. **Render**: evaluates the `FallDetector`, builds the `Overlay`, and on an
//!    alert hands the frame to the `UploadQueue`.
//!
//! A fourth thread, the upload worker, encodes and delivers evidence frames.
//! Slots overwrite, so a slow stage sees only the freshest work. Uploads are
//! best effort and never block rendering.
//!
//! # Module Structure
//!
//! - `frame`: Frames, display geometry, resolution presets
//! - `slot`: Overwrite handoff between threads
//! - `inference`: Pose types and the engine seam
//! - `fall`: Shoulder history, candidate test, alert cooldown
//! - `overlay`: Overlay descriptor, skeleton and FPS counter
//! - `render`: Per-frame render work and overlay sinks
//! - `upload`: Bounded upload queue, JPEG encoding, HTTP notifier
//! - `pipeline`: Thread orchestration and shutdown
//! - `ingest`: Synthetic frame source
//! - `config`: File + environment configuration

pub mod config;
pub mod fall;
pub mod frame;
pub mod inference;
pub mod ingest;
pub mod overlay;
pub mod pipeline;
pub mod render;
pub mod slot;
pub mod upload;

pub use config::SentinelConfig;
pub use fall::{FallConfig, FallDetector, FallEvaluation, FallState, ShoulderHistory};
pub use frame::{DisplayTransform, Frame, FrameSize, InferenceBox, Resolution};
pub use inference::{
    InferenceResult, Keypoint, KeypointLabel, Pose, PoseEngine, ShoulderScript, StubPoseEngine,
};
pub use ingest::{FeedConfig, SyntheticFeed};
pub use overlay::{FpsCounter, Overlay};
pub use pipeline::{FrameFeedHandle, Pipeline, PipelineConfig, PipelineStats};
pub use render::{LogOverlaySink, OverlaySink, RenderOutput, RenderStage, SvgFileSink};
pub use slot::SyncSlot;
pub use upload::{
    Delivery, FrameEncoder, HttpNotifier, JpegFrameEncoder, Notifier, UploadQueue, UploadSender,
    UploadStats,
};
