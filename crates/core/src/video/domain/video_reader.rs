use std::path::PathBuf;

use thiserror::Error;

use crate::shared::frame::Frame;

use super::source_metadata::SourceMetadata;

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("failed to open {source_name}: {message}")]
    Open {
        source_name: String,
        message: String,
    },
    #[error("no video stream in {0}")]
    NoVideoStream(String),
    #[error("reader used before open")]
    NotOpened,
    #[error("failed to decode frame: {0}")]
    Decode(String),
    #[error("failed to read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image {path} is {actual:?}, expected {expected:?} like the first image")]
    SizeMismatch {
        path: PathBuf,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("no images found in {0}")]
    EmptySequence(PathBuf),
}

/// Reads frames from a video file, stream URL, capture device or image
/// sequence.
///
/// Frames come out in capture order with `Frame::index` counting from 0.
pub trait VideoReader: Send {
    /// Opens `source` and returns its metadata.
    fn open(&mut self, source: &str) -> Result<SourceMetadata, VideoError>;

    /// Returns an iterator over frames in decode order.
    fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame, VideoError>> + '_>;

    /// Releases any resources held by the reader.
    fn close(&mut self);
}
