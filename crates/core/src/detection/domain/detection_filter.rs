use std::collections::BTreeSet;

use crate::shared::scanner_config::ScannerConfig;

use super::detection::Detection;

/// Keeps detections of allow-listed labels whose confidence is strictly above
/// the threshold. A detection exactly at the threshold is dropped.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionFilter {
    allow_list: BTreeSet<String>,
    confidence_threshold: f32,
}

impl DetectionFilter {
    pub fn new(allow_list: BTreeSet<String>, confidence_threshold: f32) -> Self {
        Self {
            allow_list,
            confidence_threshold,
        }
    }

    pub fn from_config(config: &ScannerConfig) -> Self {
        Self::new(config.allow_list.clone(), config.confidence_threshold)
    }

    pub fn accepts(&self, detection: &Detection) -> bool {
        detection.confidence > self.confidence_threshold
            && self.allow_list.contains(&detection.label)
    }

    pub fn filter(&self, detections: &[Detection]) -> Vec<Detection> {
        detections
            .iter()
            .filter(|d| self.accepts(d))
            .cloned()
            .collect()
    }

    pub fn allow_list(&self) -> &BTreeSet<String> {
        &self.allow_list
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }
}
