mod engine;
mod engines;
mod result;

pub use engine::PoseEngine;
pub use engines::{ShoulderScript, StubPoseEngine};
pub use result::{InferenceResult, Keypoint, KeypointLabel, Pose};
