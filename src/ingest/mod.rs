//! Frame sources feeding the pipeline.
//!
//! Only the synthetic `stub://` source ships in this crate. Camera capture
//! (crop, letterbox, stride removal) lives outside and hands over frames the
//! same way: `Frame` values published through a `FrameFeedHandle`.

pub mod synthetic;

pub use synthetic::{FeedConfig, FeedStats, SyntheticFeed, STUB_SCHEME};
