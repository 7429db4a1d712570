use anyhow::Result;

use crate::frame::{Frame, FrameSize};
use crate::inference::result::InferenceResult;

/// Pose inference engine.
///
/// # Audit Boundary
///
/// Engines receive frames by reference for the duration of one call and
/// return only keypoints. Implementations MUST NOT:
/// - Keep the frame or its pixels past `infer`
/// - Write frames to disk or send them over the network
///
/// An error from `infer` is treated as a hard dependency failure and stops the
/// pipeline. Engines that can recover from a bad frame should do so internally
/// and return an empty result instead.
pub trait PoseEngine: Send {
    /// Engine identifier.
    fn name(&self) -> &'static str;

    /// Size frames must be delivered at.
    fn input_size(&self) -> FrameSize;

    /// Run inference on one frame.
    ///
    /// Keypoint coordinates are in the frame's pixel space (pre display scale).
    fn infer(&mut self, frame: &Frame) -> Result<InferenceResult>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
