use std::path::PathBuf;

use thiserror::Error;

use crate::shared::frame::Frame;

use super::detection::Detection;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("failed to load model {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("unexpected model output: {0}")]
    Output(String),
    #[error("failed to read replay file {path}: {source}")]
    ReplayRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("replay file {path}, line {line}: {source}")]
    ReplayParse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Domain interface for object detection.
///
/// Takes `&mut self` because sessions and replay cursors carry state between
/// frames. The returned detections are unfiltered.
pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError>;
}
