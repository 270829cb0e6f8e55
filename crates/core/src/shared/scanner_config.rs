use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::{
    DEFAULT_ALLOW_LIST, DEFAULT_ASSUMED_FRAME_RATE, DEFAULT_CONFIDENCE_THRESHOLD,
    DEFAULT_FRAME_SKIP, DEFAULT_PERSISTENCE_WINDOW,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("frame_skip must be >= 1, got {0}")]
    FrameSkip(usize),
    #[error("assumed_frame_rate must be a finite number > 0, got {0}")]
    FrameRate(f64),
    #[error("confidence_threshold must be within 0.0-1.0, got {0}")]
    ConfidenceThreshold(f32),
    #[error("allow_list must name at least one object label")]
    EmptyAllowList,
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything that shapes a scan: which objects count, how confident the
/// detector must be, how frames are sampled and how long a label may vanish.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub allow_list: BTreeSet<String>,
    pub confidence_threshold: f32,
    pub frame_skip: usize,
    pub persistence_window: u64,
    pub assumed_frame_rate: f64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            allow_list: DEFAULT_ALLOW_LIST.iter().map(|s| s.to_string()).collect(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            frame_skip: DEFAULT_FRAME_SKIP,
            persistence_window: DEFAULT_PERSISTENCE_WINDOW,
            assumed_frame_rate: DEFAULT_ASSUMED_FRAME_RATE,
        }
    }
}

impl ScannerConfig {
    /// Reads a JSON config file; absent fields fall back to the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_skip < 1 {
            return Err(ConfigError::FrameSkip(self.frame_skip));
        }
        validate_frame_rate(self.assumed_frame_rate)?;
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::ConfidenceThreshold(self.confidence_threshold));
        }
        if self.allow_list.is_empty() {
            return Err(ConfigError::EmptyAllowList);
        }
        Ok(())
    }
}

pub(crate) fn validate_frame_rate(rate: f64) -> Result<(), ConfigError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::FrameRate(rate))
    }
}
