//! Overlay descriptor handed to the display sink.
//!
//! The descriptor is a plain list of text lines and line segments in display
//! pixels. `Overlay::to_svg` renders it for sinks that take SVG.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::time::Instant;

use crate::frame::{DisplayTransform, FrameSize};
use crate::inference::{KeypointLabel, Pose};

/// Keypoints scoring below this are not drawn.
pub const DRAW_SCORE_THRESHOLD: f32 = 0.2;
pub const ALERT_BANNER: &str = "FALL DETECTED!";
pub const STATUS_FONT_SIZE: u32 = 16;
pub const BANNER_FONT_SIZE: u32 = 24;

pub const SKELETON_EDGES: [(KeypointLabel, KeypointLabel); 3] = [
    (KeypointLabel::Nose, KeypointLabel::LeftShoulder),
    (KeypointLabel::Nose, KeypointLabel::RightShoulder),
    (KeypointLabel::LeftShoulder, KeypointLabel::RightShoulder),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextLine {
    pub x: i32,
    pub y: i32,
    pub text: String,
    pub font_size: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub start: (i32, i32),
    pub end: (i32, i32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Overlay {
    pub size: FrameSize,
    pub text: Vec<TextLine>,
    pub skeleton: Vec<Segment>,
    pub banner: Option<TextLine>,
}

impl Overlay {
    pub fn new(size: FrameSize) -> Self {
        Self {
            size,
            text: Vec::new(),
            skeleton: Vec::new(),
            banner: None,
        }
    }

    pub fn push_text(&mut self, x: i32, y: i32, text: impl Into<String>, font_size: u32) {
        self.text.push(TextLine {
            x,
            y,
            text: text.into(),
            font_size,
        });
    }

    pub fn set_alert_banner(&mut self) {
        self.banner = Some(TextLine {
            x: 10,
            y: 50,
            text: ALERT_BANNER.to_string(),
            font_size: BANNER_FONT_SIZE,
        });
    }

    /// Add skeleton edges whose endpoints both clear the draw threshold.
    pub fn add_pose(&mut self, pose: &Pose, transform: &DisplayTransform) {
        let point = |label: KeypointLabel| {
            pose.get(label)
                .filter(|kp| kp.score >= DRAW_SCORE_THRESHOLD)
                .map(|kp| {
                    let (x, y) = transform.map_point(kp.x, kp.y);
                    (x as i32, y as i32)
                })
        };
        for (a, b) in SKELETON_EDGES {
            if let (Some(start), Some(end)) = (point(a), point(b)) {
                self.skeleton.push(Segment { start, end });
            }
        }
    }

    /// SVG document sized to the display. Text gets a 1px black drop shadow.
    pub fn to_svg(&self) -> String {
        let mut svg = String::with_capacity(512);
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}">"#,
            self.size.width, self.size.height
        );
        for line in self.text.iter().chain(self.banner.as_ref()) {
            shadow_text(&mut svg, line);
        }
        for seg in &self.skeleton {
            let _ = write!(
                svg,
                r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="yellow" stroke-width="2"/>"#,
                seg.start.0, seg.start.1, seg.end.0, seg.end.1
            );
        }
        svg.push_str("</svg>");
        svg
    }
}

fn shadow_text(svg: &mut String, line: &TextLine) {
    let text = escape_xml(&line.text);
    for (dx, fill) in [(1, "black"), (0, "white")] {
        let _ = write!(
            svg,
            r#"<text x="{}" y="{}" fill="{}" font-size="{}" style="font-family:sans-serif">{}</text>"#,
            line.x + dx,
            line.y + dx,
            fill,
            line.font_size,
            text
        );
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

// ----------------------------------------------------------------------------
// Frame rate
// ----------------------------------------------------------------------------

/// Moving-average frame rate over the last `window` intervals.
#[derive(Debug)]
pub struct FpsCounter {
    intervals: VecDeque<f64>,
    window: usize,
    prev: Option<Instant>,
}

impl FpsCounter {
    pub const DEFAULT_WINDOW: usize = 30;

    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            intervals: VecDeque::with_capacity(window),
            window,
            prev: None,
        }
    }

    /// Record a tick and return the current rate. The first tick reports 0.
    pub fn tick(&mut self, now: Instant) -> f64 {
        let Some(prev) = self.prev.replace(now) else {
            return 0.0;
        };
        if self.intervals.len() == self.window {
            self.intervals.pop_front();
        }
        self.intervals
            .push_back(now.saturating_duration_since(prev).as_secs_f64());
        let total: f64 = self.intervals.iter().sum();
        if total > 0.0 {
            self.intervals.len() as f64 / total
        } else {
            0.0
        }
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}
