use crate::tracking::domain::object_state::FrameIndex;

/// Picks every `frame_skip`-th captured frame for detection and numbers the
/// picked frames contiguously from 0.
///
/// Capture index `i` (0-based) is picked when `(i + 1) % frame_skip == 0`, so
/// with `frame_skip = 2` frames 1, 3, 5 are processed.
#[derive(Clone, Debug)]
pub struct FrameSampler {
    frame_skip: usize,
    sampled: FrameIndex,
}

impl FrameSampler {
    pub fn new(frame_skip: usize) -> Result<Self, &'static str> {
        if frame_skip < 1 {
            return Err("frame_skip must be >= 1");
        }
        Ok(Self {
            frame_skip,
            sampled: 0,
        })
    }

    /// Returns the sampled index for `source_index`, or `None` if the frame is
    /// skipped. Expects source indices in increasing order.
    pub fn sample(&mut self, source_index: usize) -> Option<FrameIndex> {
        if (source_index + 1) % self.frame_skip != 0 {
            return None;
        }
        let index = self.sampled;
        self.sampled += 1;
        Some(index)
    }

    pub fn frame_skip(&self) -> usize {
        self.frame_skip
    }

    /// Number of frames accepted so far.
    pub fn sampled_count(&self) -> u64 {
        self.sampled
    }
}
