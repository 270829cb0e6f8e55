use chrono::{DateTime, Local};

use crate::tracking::domain::object_state::FrameIndex;

/// Record of one continuous visibility interval of a label.
///
/// `duration_seconds` is `observed_frames / assumed_frame_rate`: an estimate
/// from the number of sampled frames the label was seen in, not elapsed
/// wall-clock time.
#[derive(Clone, Debug, PartialEq)]
pub struct PresenceEvent {
    label: String,
    logged_at: DateTime<Local>,
    duration_seconds: f64,
    first_seen: FrameIndex,
    last_seen: FrameIndex,
    observed_frames: u64,
}

impl PresenceEvent {
    pub fn new(
        label: String,
        logged_at: DateTime<Local>,
        duration_seconds: f64,
        first_seen: FrameIndex,
        last_seen: FrameIndex,
        observed_frames: u64,
    ) -> Self {
        Self {
            label,
            logged_at,
            duration_seconds,
            first_seen,
            last_seen,
            observed_frames,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn logged_at(&self) -> DateTime<Local> {
        self.logged_at
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn first_seen(&self) -> FrameIndex {
        self.first_seen
    }

    pub fn last_seen(&self) -> FrameIndex {
        self.last_seen
    }

    pub fn observed_frames(&self) -> u64 {
        self.observed_frames
    }
}
