mod stub;

pub use stub::{ShoulderScript, StubPoseEngine};
