use std::collections::BTreeMap;
use std::time::Instant;

/// Observer for scan orchestration: progress, stage timings and metrics.
///
/// Keeps the use case free of any particular output mechanism.
pub trait ScanLogger: Send {
    /// Report source-frame progress. `total` is 0 for sources of unknown length.
    fn progress(&mut self, current: usize, total: usize);

    /// Record how long a named stage took for one sampled frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. detections kept per frame).
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Emit an end-of-scan summary. Default: no-op.
    fn summary(&self) {}
}

pub struct NullScanLogger;

impl ScanLogger for NullScanLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Logger backed by the `log` facade. Tracks per-stage timing and metrics
/// and reports them in a summary once the scan ends.
///
/// Progress lines are throttled to every `throttle_frames` frames.
pub struct LogScanLogger {
    throttle_frames: usize,
    timings: BTreeMap<String, Vec<f64>>,
    metrics: BTreeMap<String, Vec<f64>>,
    start_time: Instant,
    frames_seen: usize,
}

impl LogScanLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            start_time: Instant::now(),
            frames_seen: 0,
        }
    }

    /// Returns the formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let frames = self.frames_seen;
        let mut lines = vec![format!(
            "Scan summary ({frames} frames, {:.1}s total):",
            elapsed_ms / 1000.0
        )];

        for (stage, durations) in &self.timings {
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = mean(durations);
            let pct = if elapsed_ms > 0.0 {
                total_ms / elapsed_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms  ({pct:4.1}%)"
            ));
        }

        for (name, values) in &self.metrics {
            lines.push(format!("  {name}: avg {:.1}", mean(values)));
        }

        if frames > 0 && elapsed_ms > 0.0 {
            let fps = frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl Default for LogScanLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ScanLogger for LogScanLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.frames_seen = current;
        if current % self.throttle_frames != 0 && current != total {
            return;
        }
        if total > 0 {
            let pct = current as f64 / total as f64 * 100.0;
            log::info!("Scanning: {current}/{total} frames ({pct:.1}%)");
        } else {
            log::info!("Scanning: {current} frames");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullScanLogger;
        logger.progress(1, 10);
        logger.timing("detect", 5.0);
        logger.metric("kept", 3.0);
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_timing_records_values() {
        let mut logger = LogScanLogger::new(10);
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("track", 5.0);

        assert_eq!(logger.timings_for("detect").unwrap(), &[20.0, 30.0]);
        assert_eq!(logger.timings_for("track").unwrap(), &[5.0]);
        assert!(logger.timings_for("missing").is_none());
    }

    #[test]
    fn test_metric_average_in_summary() {
        let mut logger = LogScanLogger::new(10);
        logger.progress(5, 5);
        logger.metric("detections_kept", 3.0);
        logger.metric("detections_kept", 4.0);

        let values = logger.metrics_for("detections_kept").unwrap();
        assert_relative_eq!(mean(values), 3.5);
        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("detections_kept: avg 3.5"));
    }

    #[test]
    fn test_summary_lists_stages_and_throughput() {
        let mut logger = LogScanLogger::new(10);
        logger.progress(100, 0);
        logger.timing("detect", 10.0);
        logger.timing("track", 1.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.starts_with("Scan summary (100 frames"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("track"));
        assert!(summary.contains("fps"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(LogScanLogger::new(10).summary_string().is_none());
    }

    #[test]
    fn test_throttle_never_zero() {
        let logger = LogScanLogger::new(0);
        assert_eq!(logger.throttle_frames, 1);
        assert_eq!(LogScanLogger::default().throttle_frames, 100);
    }
}
