use std::collections::BTreeMap;
use std::time::Duration;

/// Anatomical keypoint labels, in PoseNet output order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeypointLabel {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

/// Keypoint in inference-input pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Confidence in [0, 1].
    pub score: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, score: f32) -> Self {
        Self {
            x,
            y,
            score: score.clamp(0.0, 1.0),
        }
    }

    /// Strictly above the threshold.
    pub fn exceeds(&self, threshold: f32) -> bool {
        self.score > threshold
    }
}

/// One detected subject. Keypoints are ordered by label.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pose {
    keypoints: BTreeMap<KeypointLabel, Keypoint>,
}

impl Pose {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, label: KeypointLabel, keypoint: Keypoint) -> Self {
        self.keypoints.insert(label, keypoint);
        self
    }

    pub fn get(&self, label: KeypointLabel) -> Option<&Keypoint> {
        self.keypoints.get(&label)
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Poses detected in one frame plus the time the engine spent on it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InferenceResult {
    pub poses: Vec<Pose>,
    pub latency: Duration,
}
