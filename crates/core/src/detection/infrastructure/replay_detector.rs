use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;

use crate::detection::domain::detection::Detection;
use crate::detection::domain::object_detector::{DetectionError, ObjectDetector};
use crate::shared::frame::Frame;

/// One line of a replay file.
#[derive(Debug, Deserialize)]
struct ReplayRecord {
    frame: usize,
    #[serde(default)]
    detections: Vec<Detection>,
}

/// Replays pre-recorded detections by source frame index.
///
/// Lets a scan be re-run against a different allow-list, threshold or window
/// without the model. Frames absent from the recording yield no detections;
/// repeated records for one frame are concatenated.
pub struct ReplayDetector {
    recorded: HashMap<usize, Vec<Detection>>,
}

impl ReplayDetector {
    pub fn new(recorded: HashMap<usize, Vec<Detection>>) -> Self {
        Self { recorded }
    }

    /// Loads a JSON-lines file, one record per line:
    ///
    /// ```text
    /// {"frame": 12, "detections": [{"label": "cup", "confidence": 0.8, "bbox": [x1, y1, x2, y2]}]}
    /// ```
    ///
    /// Blank lines are skipped.
    pub fn from_jsonl(path: &Path) -> Result<Self, DetectionError> {
        let read_err = |source| DetectionError::ReplayRead {
            path: path.to_path_buf(),
            source,
        };
        let reader = BufReader::new(File::open(path).map_err(read_err)?);

        let mut recorded: HashMap<usize, Vec<Detection>> = HashMap::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(read_err)?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ReplayRecord =
                serde_json::from_str(&line).map_err(|source| DetectionError::ReplayParse {
                    path: path.to_path_buf(),
                    line: i + 1,
                    source,
                })?;
            recorded
                .entry(record.frame)
                .or_default()
                .extend(record.detections);
        }

        log::debug!(
            "Loaded replay {} ({} frames with detections)",
            path.display(),
            recorded.len()
        );
        Ok(Self::new(recorded))
    }

    pub fn recorded_frames(&self) -> usize {
        self.recorded.len()
    }
}

impl ObjectDetector for ReplayDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        Ok(self
            .recorded
            .get(&frame.index())
            .cloned()
            .unwrap_or_default())
    }
}
