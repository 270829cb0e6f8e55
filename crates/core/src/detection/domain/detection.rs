use serde::{Deserialize, Serialize};

use crate::shared::bounding_box::BoundingBox;

/// One labeled box reported by a detector for a single frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }

    /// Caption a renderer draws next to the box.
    pub fn caption(&self) -> String {
        self.label.to_uppercase()
    }
}
