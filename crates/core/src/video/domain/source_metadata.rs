/// Properties of an opened frame source.
///
/// `fps` is 0 when the container does not report a rate (image sequences,
/// some live captures) and `total_frames` is 0 when the length is unknown.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub codec: String,
    pub source: String,
}

impl SourceMetadata {
    /// The reported rate when known, otherwise `fallback`.
    pub fn fps_or(&self, fallback: f64) -> f64 {
        if self.fps.is_finite() && self.fps > 0.0 {
            self.fps
        } else {
            fallback
        }
    }
}
