use anyhow::{anyhow, Result};
use std::time::Instant;

use crate::frame::{Frame, FrameSize, CHANNELS};
use crate::inference::engine::PoseEngine;
use crate::inference::result::{InferenceResult, Keypoint, KeypointLabel, Pose};

/// Shoulder trajectory played back by `StubPoseEngine`.
///
/// Each cycle of `period` frames holds the shoulders at `baseline_y`, then
/// spends the last `fallen_frames` of the cycle `drop` pixels lower.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShoulderScript {
    pub baseline_y: f32,
    pub drop: f32,
    pub period: u64,
    pub fallen_frames: u64,
}

impl Default for ShoulderScript {
    fn default() -> Self {
        Self {
            baseline_y: 150.0,
            drop: 120.0,
            period: 150,
            fallen_frames: 20,
        }
    }
}

/// Stub engine for running the pipeline without a model.
///
/// Emits one subject per frame whose shoulders follow a `ShoulderScript`.
pub struct StubPoseEngine {
    input_size: FrameSize,
    script: ShoulderScript,
    frame_count: u64,
}

impl StubPoseEngine {
    pub fn new(input_size: FrameSize, script: ShoulderScript) -> Result<Self> {
        if script.period == 0 {
            return Err(anyhow!("shoulder script period must be >= 1"));
        }
        if script.fallen_frames >= script.period {
            return Err(anyhow!(
                "shoulder script fallen_frames ({}) must be shorter than period ({})",
                script.fallen_frames,
                script.period
            ));
        }
        Ok(Self {
            input_size,
            script,
            frame_count: 0,
        })
    }

    fn shoulder_y(&self) -> f32 {
        let phase = (self.frame_count - 1) % self.script.period;
        if phase >= self.script.period - self.script.fallen_frames {
            self.script.baseline_y + self.script.drop
        } else {
            self.script.baseline_y
        }
    }
}

impl PoseEngine for StubPoseEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_size(&self) -> FrameSize {
        self.input_size
    }

    fn infer(&mut self, frame: &Frame) -> Result<InferenceResult> {
        let started = Instant::now();
        let FrameSize { width, height } = self.input_size;
        let expected = width as usize * height as usize * CHANNELS;
        if frame.size() != self.input_size || frame.input_tensor().len() != expected {
            return Err(anyhow!(
                "input tensor shape mismatch: frame is {}, engine expects {}",
                frame.size(),
                self.input_size
            ));
        }
        self.frame_count += 1;

        let cx = width as f32 / 2.0;
        let y = self.shoulder_y();
        let pose = Pose::new()
            .with(KeypointLabel::Nose, Keypoint::new(cx, y - 40.0, 0.9))
            .with(KeypointLabel::LeftShoulder, Keypoint::new(cx + 30.0, y, 0.9))
            .with(KeypointLabel::RightShoulder, Keypoint::new(cx - 30.0, y, 0.9));

        Ok(InferenceResult {
            poses: vec![pose],
            latency: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(size: FrameSize) -> Frame {
        let len = size.width as usize * size.height as usize * 3;
        Frame::new(vec![0u8; len], size.width, size.height).unwrap()
    }

    fn shoulder_y(result: &InferenceResult) -> f32 {
        result.poses[0].get(KeypointLabel::LeftShoulder).unwrap().y
    }

    #[test]
    fn stub_engine_plays_script() {
        let size = FrameSize::new(8, 8);
        let script = ShoulderScript {
            baseline_y: 100.0,
            drop: 70.0,
            period: 4,
            fallen_frames: 1,
        };
        let mut engine = StubPoseEngine::new(size, script).unwrap();
        let ys: Vec<f32> = (0..8)
            .map(|_| shoulder_y(&engine.infer(&frame(size)).unwrap()))
            .collect();
        assert_eq!(ys, vec![100.0, 100.0, 100.0, 170.0, 100.0, 100.0, 100.0, 170.0]);
    }

    #[test]
    fn stub_engine_rejects_wrong_input_size() {
        let mut engine =
            StubPoseEngine::new(FrameSize::new(8, 8), ShoulderScript::default()).unwrap();
        let err = engine.infer(&frame(FrameSize::new(4, 4))).unwrap_err();
        assert!(err.to_string().contains("shape mismatch"));
    }

    #[test]
    fn stub_engine_validates_script() {
        let bad = ShoulderScript {
            period: 5,
            fallen_frames: 5,
            ..ShoulderScript::default()
        };
        assert!(StubPoseEngine::new(FrameSize::new(8, 8), bad).is_err());
    }
}
