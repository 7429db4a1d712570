//! Fall detection heuristic.
//!
//! The detector tracks the vertical position of the shoulder midpoint across
//! frames. A fall candidate is a frame where the midpoint has moved down by
//! more than `threshold` display pixels across the last `history_capacity`
//! samples. Candidates become alerts at most once per `cooldown`.
//!
//! The detector is owned by the render thread and never shared.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::frame::DisplayTransform;
use crate::inference::{KeypointLabel, Pose};

pub const DEFAULT_FALL_THRESHOLD: f32 = 50.0;
pub const DEFAULT_FALL_COOLDOWN: Duration = Duration::from_secs(5);
pub const SHOULDER_HISTORY_CAPACITY: usize = 10;
/// Both shoulders must score strictly above this to count.
pub const SHOULDER_SCORE_THRESHOLD: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FallConfig {
    /// Downward displacement (display pixels) that marks a candidate.
    pub threshold: f32,
    /// Minimum interval between emitted alerts.
    pub cooldown: Duration,
    /// Samples compared end to end.
    pub history_capacity: usize,
}

impl Default for FallConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_FALL_THRESHOLD,
            cooldown: DEFAULT_FALL_COOLDOWN,
            history_capacity: SHOULDER_HISTORY_CAPACITY,
        }
    }
}

// ----------------------------------------------------------------------------
// ShoulderHistory
// ----------------------------------------------------------------------------

/// Fixed-capacity ring of shoulder-midpoint Y samples, oldest first.
#[derive(Clone, Debug)]
pub struct ShoulderHistory {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl ShoulderHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, returning the evicted oldest one when full.
    pub fn push(&mut self, y: f32) -> Option<f32> {
        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(y);
        evicted
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn oldest(&self) -> Option<f32> {
        self.samples.front().copied()
    }

    pub fn newest(&self) -> Option<f32> {
        self.samples.back().copied()
    }

    /// `newest - oldest`, only once the window is full.
    pub fn displacement(&self) -> Option<f32> {
        if !self.is_full() {
            return None;
        }
        Some(self.newest()? - self.oldest()?)
    }
}

// ----------------------------------------------------------------------------
// FallDetector
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallState {
    Idle,
    Cooldown,
}

/// Outcome of one evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FallEvaluation {
    /// Poses with both shoulders confidently detected.
    pub qualifying_poses: usize,
    /// Largest full-window displacement seen this frame.
    pub displacement: Option<f32>,
    /// Displacement exceeded the threshold.
    pub candidate: bool,
    /// Candidate passed the cooldown gate.
    pub alert: bool,
}

pub struct FallDetector {
    config: FallConfig,
    history: ShoulderHistory,
    last_alert: Option<Instant>,
}

impl FallDetector {
    pub fn new(config: FallConfig) -> Self {
        Self {
            history: ShoulderHistory::new(config.history_capacity),
            config,
            last_alert: None,
        }
    }

    pub fn config(&self) -> &FallConfig {
        &self.config
    }

    pub fn history(&self) -> &ShoulderHistory {
        &self.history
    }

    pub fn last_alert(&self) -> Option<Instant> {
        self.last_alert
    }

    /// Cooldown is re-derived from the clock; there is no explicit transition.
    pub fn state(&self, now: Instant) -> FallState {
        if self.cooldown_elapsed(now) {
            FallState::Idle
        } else {
            FallState::Cooldown
        }
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.last_alert {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.config.cooldown,
        }
    }

    /// Evaluate one frame's poses.
    ///
    /// Every qualifying pose appends to the shared history and is checked on
    /// its own; at most one alert is emitted per call. Frames with no
    /// qualifying pose leave the history untouched.
    pub fn evaluate(
        &mut self,
        poses: &[Pose],
        transform: &DisplayTransform,
        now: Instant,
    ) -> FallEvaluation {
        let mut eval = FallEvaluation::default();

        for pose in poses {
            let Some(mid_y) = shoulder_midpoint_y(pose, transform) else {
                continue;
            };
            eval.qualifying_poses += 1;
            self.history.push(mid_y);

            if let Some(delta) = self.history.displacement() {
                eval.displacement = Some(eval.displacement.map_or(delta, |d: f32| d.max(delta)));
                if delta > self.config.threshold {
                    eval.candidate = true;
                }
            }
        }

        if eval.candidate && self.cooldown_elapsed(now) {
            self.last_alert = Some(now);
            eval.alert = true;
        }
        eval
    }
}

/// Display-space Y of the shoulder midpoint, when both shoulders qualify.
pub fn shoulder_midpoint_y(pose: &Pose, transform: &DisplayTransform) -> Option<f32> {
    let left = pose.get(KeypointLabel::LeftShoulder)?;
    let right = pose.get(KeypointLabel::RightShoulder)?;
    if !(left.exceeds(SHOULDER_SCORE_THRESHOLD) && right.exceeds(SHOULDER_SCORE_THRESHOLD)) {
        return None;
    }
    Some((transform.map_y(left.y) + transform.map_y(right.y)) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameSize, InferenceBox};
    use crate::inference::Keypoint;

    fn shoulders(y: f32) -> Pose {
        shoulders_scored(y, 0.9, 0.9)
    }

    fn shoulders_scored(y: f32, left: f32, right: f32) -> Pose {
        Pose::new()
            .with(KeypointLabel::LeftShoulder, Keypoint::new(120.0, y, left))
            .with(KeypointLabel::RightShoulder, Keypoint::new(80.0, y, right))
    }

    fn feed(detector: &mut FallDetector, y: f32, now: Instant) -> FallEvaluation {
        detector.evaluate(&[shoulders(y)], &DisplayTransform::identity(), now)
    }

    #[test]
    fn history_evicts_oldest_on_overflow() {
        let mut history = ShoulderHistory::new(SHOULDER_HISTORY_CAPACITY);
        for i in 0..10 {
            assert_eq!(history.push(i as f32), None);
        }
        assert!(history.is_full());
        assert_eq!(history.push(10.0), Some(0.0));
        assert_eq!(history.len(), 10);
        assert_eq!(history.oldest(), Some(1.0));
        assert_eq!(history.newest(), Some(10.0));
    }

    #[test]
    fn displacement_requires_full_window() {
        let mut history = ShoulderHistory::new(3);
        history.push(1.0);
        history.push(2.0);
        assert_eq!(history.displacement(), None);
        history.push(9.0);
        assert_eq!(history.displacement(), Some(8.0));
    }

    #[test]
    fn constant_height_never_alerts() {
        let mut detector = FallDetector::new(FallConfig::default());
        let t0 = Instant::now();
        for i in 0..100 {
            let eval = feed(&mut detector, 100.0, t0 + Duration::from_millis(100 * i));
            assert!(!eval.candidate);
            assert!(!eval.alert);
        }
        assert_eq!(detector.history().len(), SHOULDER_HISTORY_CAPACITY);
    }

    #[test]
    fn alert_then_cooldown_suppresses() {
        let mut detector = FallDetector::new(FallConfig::default());
        let t0 = Instant::now();
        for i in 0..9 {
            feed(&mut detector, 100.0, t0 + Duration::from_millis(100 * i));
        }
        let t_alert = t0 + Duration::from_millis(900);
        let eval = feed(&mut detector, 160.0, t_alert);
        assert_eq!(eval.displacement, Some(60.0));
        assert!(eval.alert);
        assert_eq!(detector.state(t_alert), FallState::Cooldown);

        // Still over threshold but inside the cooldown window.
        for i in 1..=4 {
            let eval = feed(&mut detector, 160.0, t_alert + Duration::from_secs(i));
            assert!(eval.candidate);
            assert!(!eval.alert);
        }
        // Exactly at the cooldown boundary is still suppressed.
        let eval = feed(&mut detector, 160.0, t_alert + DEFAULT_FALL_COOLDOWN);
        assert!(eval.candidate);
        assert!(!eval.alert);
        assert_eq!(
            detector.state(t_alert + DEFAULT_FALL_COOLDOWN + Duration::from_millis(1)),
            FallState::Idle
        );
    }

    #[test]
    fn fall_scenario_alerts_once_per_cooldown() {
        let mut detector = FallDetector::new(FallConfig::default());
        let t0 = Instant::now();
        let mut alerts = 0;
        for i in 0..9 {
            alerts += feed(&mut detector, 100.0, t0 + Duration::from_millis(100 * i)).alert as u32;
        }
        let eval = feed(&mut detector, 170.0, t0 + Duration::from_millis(900));
        assert_eq!(eval.displacement, Some(70.0));
        alerts += eval.alert as u32;
        for i in 1..=3 {
            let now = t0 + Duration::from_millis(900 + 1000 * i);
            alerts += feed(&mut detector, 170.0, now).alert as u32;
        }
        assert_eq!(alerts, 1);

        // Window is now [100 x6, 170 x4]; one more sample after the cooldown.
        let eval = feed(&mut detector, 170.0, t0 + Duration::from_millis(6_000));
        assert_eq!(eval.displacement, Some(70.0));
        assert!(eval.alert);
    }

    #[test]
    fn low_confidence_shoulders_leave_history_untouched() {
        let mut detector = FallDetector::new(FallConfig::default());
        let now = Instant::now();
        let poses = [
            shoulders_scored(100.0, 0.5, 0.9),
            shoulders_scored(100.0, 0.9, 0.2),
            Pose::new().with(KeypointLabel::LeftShoulder, Keypoint::new(0.0, 0.0, 1.0)),
        ];
        let eval = detector.evaluate(&poses, &DisplayTransform::identity(), now);
        assert_eq!(eval.qualifying_poses, 0);
        assert!(detector.history().is_empty());
    }

    #[test]
    fn gap_frames_preserve_window() {
        let mut detector = FallDetector::new(FallConfig::default());
        let t0 = Instant::now();
        for i in 0..9 {
            feed(&mut detector, 100.0, t0 + Duration::from_millis(100 * i));
            detector.evaluate(&[], &DisplayTransform::identity(), t0);
        }
        assert_eq!(detector.history().len(), 9);
        assert!(feed(&mut detector, 200.0, t0 + Duration::from_secs(1)).alert);
    }

    #[test]
    fn multiple_poses_emit_single_alert() {
        let mut detector = FallDetector::new(FallConfig {
            history_capacity: 2,
            ..FallConfig::default()
        });
        let now = Instant::now();
        detector.evaluate(&[shoulders(0.0)], &DisplayTransform::identity(), now);
        // Both poses produce a full window over threshold.
        let eval = detector.evaluate(
            &[shoulders(100.0), shoulders(200.0)],
            &DisplayTransform::identity(),
            now,
        );
        assert_eq!(eval.qualifying_poses, 2);
        assert!(eval.candidate);
        assert!(eval.alert);
        assert_eq!(detector.last_alert(), Some(now));
    }

    #[test]
    fn midpoint_uses_display_scale() {
        // Inference box half the display height: y doubles after the offset.
        let transform = DisplayTransform::new(
            FrameSize::new(640, 480),
            InferenceBox::new(0.0, 10.0, 640.0, 240.0).unwrap(),
        );
        let pose = Pose::new()
            .with(KeypointLabel::LeftShoulder, Keypoint::new(0.0, 60.0, 0.9))
            .with(KeypointLabel::RightShoulder, Keypoint::new(0.0, 40.0, 0.9));
        assert_eq!(shoulder_midpoint_y(&pose, &transform), Some(80.0));
    }
}
