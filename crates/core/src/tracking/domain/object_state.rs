/// Index of a sampled frame, counted contiguously from 0.
pub type FrameIndex = u64;

/// Live bookkeeping for one label that is present or in its grace window.
///
/// Invariants: `first_seen <= last_seen` and `observed_frame_count >= 1`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectState {
    label: String,
    first_seen: FrameIndex,
    last_seen: FrameIndex,
    observed_frame_count: u64,
}

impl ObjectState {
    pub fn new(label: impl Into<String>, frame: FrameIndex) -> Self {
        Self {
            label: label.into(),
            first_seen: frame,
            last_seen: frame,
            observed_frame_count: 1,
        }
    }

    /// Records a sighting at `frame`. Returns `false` without changing the
    /// state when `frame` is not newer than `last_seen`.
    pub fn observe(&mut self, frame: FrameIndex) -> bool {
        if frame <= self.last_seen {
            return false;
        }
        self.last_seen = frame;
        self.observed_frame_count += 1;
        true
    }

    /// Sampled frames elapsed since the last sighting.
    pub fn frames_since_seen(&self, frame: FrameIndex) -> u64 {
        frame.saturating_sub(self.last_seen)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn first_seen(&self) -> FrameIndex {
        self.first_seen
    }

    pub fn last_seen(&self) -> FrameIndex {
        self.last_seen
    }

    pub fn observed_frame_count(&self) -> u64 {
        self.observed_frame_count
    }
}
