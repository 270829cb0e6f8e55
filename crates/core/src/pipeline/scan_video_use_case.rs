use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use thiserror::Error;

use crate::detection::domain::detection::Detection;
use crate::detection::domain::detection_filter::DetectionFilter;
use crate::detection::domain::object_detector::{DetectionError, ObjectDetector};
use crate::shared::frame::Frame;
use crate::shared::scanner_config::ConfigError;
use crate::tracking::domain::object_state::FrameIndex;
use crate::tracking::domain::presence_tracker::{FrameOutcome, PresenceTracker, TrackError};
use crate::video::domain::frame_sampler::FrameSampler;
use crate::video::domain::video_reader::{VideoError, VideoReader};

use super::scan_logger::ScanLogger;

const CHANNEL_CAPACITY: usize = 8;
const DEFAULT_MAX_CONSECUTIVE_DETECTOR_FAILURES: usize = 10;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("scan already executed")]
    AlreadyExecuted,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Video(#[from] VideoError),
    #[error("detector failed on {failures} consecutive frames: {source}")]
    Detector {
        failures: usize,
        #[source]
        source: DetectionError,
    },
    #[error(transparent)]
    Sink(#[from] TrackError),
    #[error("frame reader thread panicked")]
    ReaderPanicked,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanSummary {
    pub frames_read: usize,
    pub frames_sampled: u64,
    pub detector_failures: usize,
    pub events_emitted: usize,
    pub cancelled: bool,
}

/// What a renderer needs to draw one processed frame.
#[derive(Clone, Debug)]
pub struct FrameReport<'a> {
    pub sampled_index: FrameIndex,
    pub frame: &'a Frame,
    pub detections: &'a [Detection],
}

impl FrameReport<'_> {
    pub fn source_index(&self) -> usize {
        self.frame.index()
    }

    /// Overlay caption per detection, in detection order.
    pub fn captions(&self) -> Vec<String> {
        self.detections.iter().map(Detection::caption).collect()
    }
}

type ProgressFn = Box<dyn Fn(usize, usize) -> bool + Send>;
type FrameReportFn = Box<dyn FnMut(&FrameReport<'_>) + Send>;

struct SampledFrame {
    index: FrameIndex,
    frame: Frame,
}

/// Scans a frame source for allow-listed objects and records one presence
/// event per continuous sighting.
///
/// Frames are decoded on a dedicated reader thread. Detection, filtering,
/// tracking and event writes run on the calling thread, one sampled frame at
/// a time. The tracker is always flushed before `execute` returns, whether
/// the source ended, the scan was cancelled or it failed.
///
/// Single-use: `execute` takes the reader, so calling it twice fails.
pub struct ScanVideoUseCase {
    reader: Option<Box<dyn VideoReader>>,
    detector: Box<dyn ObjectDetector>,
    filter: DetectionFilter,
    tracker: PresenceTracker,
    logger: Box<dyn ScanLogger>,
    total_frames: usize,
    on_progress: Option<ProgressFn>,
    on_frame: Option<FrameReportFn>,
    cancelled: Arc<AtomicBool>,
    max_consecutive_detector_failures: usize,
    summary: ScanSummary,
}

impl ScanVideoUseCase {
    /// `reader` must already be opened.
    pub fn new(
        reader: Box<dyn VideoReader>,
        detector: Box<dyn ObjectDetector>,
        filter: DetectionFilter,
        tracker: PresenceTracker,
        logger: Box<dyn ScanLogger>,
    ) -> Self {
        Self {
            reader: Some(reader),
            detector,
            filter,
            tracker,
            logger,
            total_frames: 0,
            on_progress: None,
            on_frame: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            max_consecutive_detector_failures: DEFAULT_MAX_CONSECUTIVE_DETECTOR_FAILURES,
            summary: ScanSummary::default(),
        }
    }

    /// Source length used for progress reporting; 0 when unknown.
    pub fn with_total_frames(mut self, total_frames: usize) -> Self {
        self.total_frames = total_frames;
        self
    }

    /// Called after every sampled frame with `(source frames read, total)`.
    /// Returning `false` cancels the scan.
    pub fn with_progress(
        mut self,
        on_progress: impl Fn(usize, usize) -> bool + Send + 'static,
    ) -> Self {
        self.on_progress = Some(Box::new(on_progress));
        self
    }

    pub fn with_frame_report(
        mut self,
        on_frame: impl FnMut(&FrameReport<'_>) + Send + 'static,
    ) -> Self {
        self.on_frame = Some(Box::new(on_frame));
        self
    }

    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn with_max_consecutive_detector_failures(mut self, max: usize) -> Self {
        self.max_consecutive_detector_failures = max;
        self
    }

    /// The tracker after (or before) the scan. Holds any state whose event
    /// could not be written.
    pub fn tracker(&self) -> &PresenceTracker {
        &self.tracker
    }

    /// Counters of the last `execute`, kept when it returned an error.
    pub fn summary(&self) -> &ScanSummary {
        &self.summary
    }

    pub fn execute(&mut self, frame_skip: usize) -> Result<ScanSummary, ScanError> {
        let sampler =
            FrameSampler::new(frame_skip).map_err(|_| ConfigError::FrameSkip(frame_skip))?;
        let reader = self.reader.take().ok_or(ScanError::AlreadyExecuted)?;

        let (tx, rx) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        let reader_handle = spawn_reader(reader, sampler, tx, self.cancelled.clone());

        let mut summary = ScanSummary::default();
        let loop_result = self.run_loop(rx, &mut summary);

        let join_result = join_reader(reader_handle).map(|frames_read| {
            summary.frames_read = frames_read;
        });
        summary.cancelled = self.cancelled.load(Ordering::Relaxed);

        let flush_result = self.tracker.flush_all();
        match &flush_result {
            Ok(events) => summary.events_emitted += events.len(),
            Err(e) => {
                summary.events_emitted += e.outcome.emitted.len();
                log::warn!(
                    "Final flush failed, {} object(s) unrecorded: {e}",
                    self.tracker.len()
                );
            }
        }
        self.summary = summary.clone();

        loop_result?;
        join_result?;
        flush_result?;

        if summary.cancelled {
            self.logger.info("Scan cancelled");
        }
        self.logger.summary();
        Ok(summary)
    }

    /// Processes sampled frames until the channel closes, the scan is
    /// cancelled or a stage fails. Dropping `rx` on return stops the reader.
    fn run_loop(
        &mut self,
        rx: crossbeam_channel::Receiver<Result<SampledFrame, VideoError>>,
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        let mut consecutive_failures = 0;

        for item in rx {
            if self.cancelled.load(Ordering::Relaxed) {
                break;
            }
            let SampledFrame { index, frame } = item?;
            summary.frames_sampled += 1;

            let t0 = Instant::now();
            let detected = self.detector.detect(&frame);
            self.logger
                .timing("detect", t0.elapsed().as_secs_f64() * 1000.0);

            match detected {
                Ok(raw) => {
                    consecutive_failures = 0;
                    self.track(index, &frame, &raw, summary)?;
                }
                Err(e) => {
                    summary.detector_failures += 1;
                    consecutive_failures += 1;
                    log::warn!("Skipping frame {} after detector error: {e}", frame.index());
                    if consecutive_failures > self.max_consecutive_detector_failures {
                        return Err(ScanError::Detector {
                            failures: consecutive_failures,
                            source: e,
                        });
                    }
                }
            }

            let current = frame.index() + 1;
            self.logger.progress(current, self.total_frames);
            if let Some(cb) = &self.on_progress {
                if !cb(current, self.total_frames) {
                    self.cancelled.store(true, Ordering::Relaxed);
                    break;
                }
            }
        }
        Ok(())
    }

    fn track(
        &mut self,
        index: FrameIndex,
        frame: &Frame,
        raw: &[Detection],
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        let kept = self.filter.filter(raw);
        self.logger.metric("detections_kept", kept.len() as f64);

        let t0 = Instant::now();
        let result = self.tracker.process_frame(index, &kept);
        self.logger
            .timing("track", t0.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(outcome) => self.record(&outcome, summary),
            Err(e) => {
                self.record(&e.outcome, summary);
                return Err(e.into());
            }
        }

        if let Some(cb) = self.on_frame.as_mut() {
            cb(&FrameReport {
                sampled_index: index,
                frame,
                detections: &kept,
            });
        }
        Ok(())
    }

    fn record(&mut self, outcome: &FrameOutcome, summary: &mut ScanSummary) {
        for label in &outcome.appeared {
            self.logger.info(&format!("Detected {label}"));
        }
        summary.events_emitted += outcome.emitted.len();
    }
}

fn spawn_reader(
    mut reader: Box<dyn VideoReader>,
    mut sampler: FrameSampler,
    tx: crossbeam_channel::Sender<Result<SampledFrame, VideoError>>,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<usize> {
    std::thread::spawn(move || {
        let mut frames_read = 0;
        for result in reader.frames() {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            let item = match result {
                Ok(frame) => {
                    frames_read += 1;
                    match sampler.sample(frame.index()) {
                        Some(index) => Ok(SampledFrame { index, frame }),
                        None => continue,
                    }
                }
                Err(e) => Err(e),
            };
            let failed = item.is_err();
            if tx.send(item).is_err() || failed {
                break;
            }
        }
        reader.close();
        frames_read
    })
}

fn join_reader(handle: JoinHandle<usize>) -> Result<usize, ScanError> {
    handle.join().map_err(|_| ScanError::ReaderPanicked)
}
