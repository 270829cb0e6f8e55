use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::detection::domain::detection::Detection;
use crate::events::domain::event_sink::{EventSink, SinkError};
use crate::events::domain::presence_event::PresenceEvent;
use crate::shared::scanner_config::{validate_frame_rate, ConfigError, ScannerConfig};

use super::object_state::{FrameIndex, ObjectState};

type Clock = Box<dyn Fn() -> DateTime<Local> + Send>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerConfig {
    persistence_window: u64,
    assumed_frame_rate: f64,
}

impl TrackerConfig {
    pub fn new(persistence_window: u64, assumed_frame_rate: f64) -> Result<Self, ConfigError> {
        validate_frame_rate(assumed_frame_rate)?;
        Ok(Self {
            persistence_window,
            assumed_frame_rate,
        })
    }

    pub fn from_scanner_config(config: &ScannerConfig) -> Result<Self, ConfigError> {
        Self::new(config.persistence_window, config.assumed_frame_rate)
    }

    /// Sampled frames a label may go undetected before it is considered gone.
    pub fn persistence_window(&self) -> u64 {
        self.persistence_window
    }

    pub fn assumed_frame_rate(&self) -> f64 {
        self.assumed_frame_rate
    }
}

/// What changed in the tracked set during one `process_frame` call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameOutcome {
    pub appeared: Vec<String>,
    pub emitted: Vec<PresenceEvent>,
}

/// A sink failure part way through committing events.
///
/// `outcome` holds what was committed before the failure: the labels that
/// appeared on this frame and every event the sink accepted. The failed
/// label and any label not yet attempted stay tracked for a later retry.
#[derive(Error, Debug)]
#[error("event sink failed after {recorded} event(s) were recorded: {source}", recorded = .outcome.emitted.len())]
pub struct TrackError {
    pub outcome: FrameOutcome,
    #[source]
    pub source: SinkError,
}

/// Turns per-frame detections into one `PresenceEvent` per continuous
/// visibility interval of each label.
///
/// Each frame first updates every label it contains, then evicts labels
/// unseen for more than `persistence_window` sampled frames. A state is
/// forgotten only once its event was appended to the sink.
pub struct PresenceTracker {
    config: TrackerConfig,
    sink: Box<dyn EventSink>,
    tracked: BTreeMap<String, ObjectState>,
    clock: Clock,
}

impl PresenceTracker {
    pub fn new(config: TrackerConfig, sink: Box<dyn EventSink>) -> Self {
        Self {
            config,
            sink,
            tracked: BTreeMap::new(),
            clock: Box::new(Local::now),
        }
    }

    /// Replaces the wall clock used to stamp events.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Local> + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn process_frame(
        &mut self,
        frame: FrameIndex,
        detections: &[Detection],
    ) -> Result<FrameOutcome, TrackError> {
        let mut outcome = FrameOutcome::default();

        let seen: BTreeSet<&str> = detections.iter().map(|d| d.label.as_str()).collect();
        for &label in &seen {
            match self.tracked.get_mut(label) {
                Some(state) => {
                    if !state.observe(frame) {
                        log::debug!(
                            "Ignoring stale sighting of '{label}' at frame {frame} (last seen {})",
                            state.last_seen()
                        );
                    }
                }
                None => {
                    log::debug!("'{label}' appeared at frame {frame}");
                    self.tracked
                        .insert(label.to_string(), ObjectState::new(label, frame));
                    outcome.appeared.push(label.to_string());
                }
            }
        }

        let window = self.config.persistence_window;
        let (expired, kept): (BTreeMap<_, _>, BTreeMap<_, _>) =
            std::mem::take(&mut self.tracked)
                .into_iter()
                .partition(|(label, state)| {
                    !seen.contains(label.as_str()) && state.frames_since_seen(frame) > window
                });
        self.tracked = kept;

        match self.commit(expired, &mut outcome.emitted) {
            Ok(()) => Ok(outcome),
            Err(source) => Err(TrackError { outcome, source }),
        }
    }

    /// Emits and forgets every tracked label regardless of the window.
    ///
    /// On failure the error's `outcome.emitted` lists the events already
    /// written; `appeared` is always empty.
    pub fn flush_all(&mut self) -> Result<Vec<PresenceEvent>, TrackError> {
        let pending = std::mem::take(&mut self.tracked);
        let mut emitted = Vec::with_capacity(pending.len());
        match self.commit(pending, &mut emitted) {
            Ok(()) => Ok(emitted),
            Err(source) => Err(TrackError {
                outcome: FrameOutcome {
                    appeared: Vec::new(),
                    emitted,
                },
                source,
            }),
        }
    }

    /// Appends one event per pending state in label order. Stops at the first
    /// failed append and puts the failed state and the rest back.
    fn commit(
        &mut self,
        pending: BTreeMap<String, ObjectState>,
        emitted: &mut Vec<PresenceEvent>,
    ) -> Result<(), SinkError> {
        let mut pending = pending.into_iter();
        while let Some((label, state)) = pending.next() {
            let event = self.event_for(&state);
            if let Err(e) = self.sink.append(&event) {
                log::warn!("Failed to record '{label}', keeping it tracked for retry: {e}");
                self.tracked.insert(label, state);
                self.tracked.extend(pending);
                return Err(e);
            }

            log::info!(
                "'{label}' gone after {} frame(s) ({:.2}s)",
                event.observed_frames(),
                event.duration_seconds()
            );
            emitted.push(event);
        }
        Ok(())
    }

    fn event_for(&self, state: &ObjectState) -> PresenceEvent {
        let count = state.observed_frame_count();
        PresenceEvent::new(
            state.label().to_string(),
            (self.clock)(),
            count as f64 / self.config.assumed_frame_rate,
            state.first_seen(),
            state.last_seen(),
            count,
        )
    }

    pub fn tracked(&self) -> impl Iterator<Item = &ObjectState> {
        self.tracked.values()
    }

    pub fn get(&self, label: &str) -> Option<&ObjectState> {
        self.tracked.get(label)
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::infrastructure::memory_event_sink::MemoryEventSink;
    use crate::shared::bounding_box::BoundingBox;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use rstest::rstest;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn tracker(window: u64) -> (PresenceTracker, MemoryEventSink) {
        let sink = MemoryEventSink::new();
        let config = TrackerConfig::new(window, 30.0).unwrap();
        let tracker = PresenceTracker::new(config, Box::new(sink.clone())).with_clock(fixed_time);
        (tracker, sink)
    }

    fn dets(labels: &[&str]) -> Vec<Detection> {
        labels
            .iter()
            .map(|l| Detection::new(*l, 0.9, BoundingBox::new(0, 0, 10, 10)))
            .collect()
    }

    /// Feeds `frames[i]` as the labels of frame `i`.
    fn run(tracker: &mut PresenceTracker, frames: &[&[&str]]) -> Vec<PresenceEvent> {
        let mut events = Vec::new();
        for (i, labels) in frames.iter().enumerate() {
            let outcome = tracker.process_frame(i as FrameIndex, &dets(labels)).unwrap();
            events.extend(outcome.emitted);
        }
        events
    }

    #[rstest]
    #[case::negative(-1.0)]
    #[case::zero(0.0)]
    #[case::nan(f64::NAN)]
    fn test_config_rejects_bad_frame_rate(#[case] rate: f64) {
        assert!(matches!(
            TrackerConfig::new(5, rate),
            Err(ConfigError::FrameRate(_))
        ));
    }

    #[test]
    fn test_config_from_scanner_config() {
        let config = TrackerConfig::from_scanner_config(&ScannerConfig::default()).unwrap();
        assert_eq!(config.persistence_window(), 5);
        assert_relative_eq!(config.assumed_frame_rate(), 30.0);
    }

    #[test]
    fn test_first_sighting_reported_as_appeared() {
        let (mut tracker, _) = tracker(5);
        let outcome = tracker.process_frame(0, &dets(&["cup", "book"])).unwrap();
        assert_eq!(outcome.appeared, vec!["book", "cup"]);

        let outcome = tracker.process_frame(1, &dets(&["cup"])).unwrap();
        assert!(outcome.appeared.is_empty());
    }

    #[test]
    fn test_three_frames_then_absent_emits_once_at_frame_eleven() {
        let (mut tracker, sink) = tracker(5);
        for frame in 0..=20 {
            let labels: &[&str] = if (3..=5).contains(&frame) { &["cup"] } else { &[] };
            let outcome = tracker.process_frame(frame, &dets(labels)).unwrap();
            if frame == 11 {
                assert_eq!(outcome.emitted.len(), 1);
            } else {
                assert!(outcome.emitted.is_empty(), "unexpected event at {frame}");
            }
            if frame == 10 {
                assert!(tracker.get("cup").is_some());
            }
        }

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].label(), "cup");
        assert_eq!(events[0].observed_frames(), 3);
        assert_eq!(events[0].first_seen(), 3);
        assert_eq!(events[0].last_seen(), 5);
        assert_relative_eq!(events[0].duration_seconds(), 0.1);
        assert_eq!(events[0].logged_at(), fixed_time());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_flicker_within_window_accumulates() {
        let (mut tracker, sink) = tracker(5);
        run(
            &mut tracker,
            &[&[], &["cup"], &[], &["cup"], &[], &["cup"], &[]],
        );

        let state = tracker.get("cup").unwrap();
        assert_eq!(state.first_seen(), 1);
        assert_eq!(state.last_seen(), 5);
        assert_eq!(state.observed_frame_count(), 3);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_two_labels_expire_independently_on_same_frame() {
        let (mut tracker, _) = tracker(2);
        tracker.process_frame(0, &dets(&["cup"])).unwrap();
        tracker.process_frame(1, &dets(&["cup"])).unwrap();
        tracker.process_frame(2, &dets(&["cup", "book"])).unwrap();
        tracker.process_frame(3, &dets(&[])).unwrap();
        tracker.process_frame(4, &dets(&[])).unwrap();

        let outcome = tracker.process_frame(5, &dets(&[])).unwrap();

        assert_eq!(outcome.emitted.len(), 2);
        let book = outcome.emitted.iter().find(|e| e.label() == "book").unwrap();
        let cup = outcome.emitted.iter().find(|e| e.label() == "cup").unwrap();
        assert_eq!(book.observed_frames(), 1);
        assert_eq!(cup.observed_frames(), 3);
        assert_relative_eq!(book.duration_seconds(), 1.0 / 30.0);
        assert_relative_eq!(cup.duration_seconds(), 0.1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_flush_emits_every_state_and_empties_set() {
        let (mut tracker, sink) = tracker(1000);
        tracker.process_frame(0, &dets(&["cup", "book", "laptop"])).unwrap();
        tracker.process_frame(1, &dets(&["cup"])).unwrap();

        let events = tracker.flush_all().unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(sink.len(), 3);
        assert!(tracker.is_empty());
        assert!(tracker.flush_all().unwrap().is_empty());
    }

    #[test]
    fn test_sink_failure_keeps_state_for_retry() {
        let (mut tracker, sink) = tracker(1);
        tracker.process_frame(0, &dets(&["book", "cup"])).unwrap();
        tracker.process_frame(1, &dets(&["laptop"])).unwrap();

        sink.fail_next(1);
        let result = tracker.process_frame(2, &dets(&["laptop"]));

        assert!(matches!(
            result,
            Err(TrackError {
                source: SinkError::Unavailable(_),
                ..
            })
        ));
        assert!(sink.is_empty());
        let book = tracker.get("book").unwrap();
        assert_eq!(book.observed_frame_count(), 1);
        assert!(tracker.get("cup").is_some());
        assert_eq!(tracker.get("laptop").unwrap().observed_frame_count(), 2);

        let outcome = tracker.process_frame(3, &dets(&[])).unwrap();
        assert_eq!(outcome.emitted.len(), 2);
        assert_eq!(sink.labels(), vec!["book", "cup"]);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_flush_failure_keeps_remaining_states() {
        let (mut tracker, sink) = tracker(5);
        tracker.process_frame(0, &dets(&["book", "cup"])).unwrap();

        sink.fail_next(1);
        assert!(tracker.flush_all().is_err());
        assert_eq!(tracker.len(), 2);

        let events = tracker.flush_all().unwrap();
        assert_eq!(events.len(), 2);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_partial_eviction_reports_recorded_events() {
        let (mut tracker, sink) = tracker(0);
        tracker.process_frame(0, &dets(&["book", "cup", "laptop"])).unwrap();

        sink.fail_after(1, 1);
        let err = tracker.process_frame(1, &dets(&["phone"])).unwrap_err();

        assert_eq!(err.outcome.appeared, vec!["phone"]);
        let recorded: Vec<_> = err.outcome.emitted.iter().map(|e| e.label()).collect();
        assert_eq!(recorded, vec!["book"]);
        assert_eq!(sink.labels(), vec!["book"]);
        let tracked: Vec<_> = tracker.tracked().map(|s| s.label()).collect();
        assert_eq!(tracked, vec!["cup", "laptop", "phone"]);

        let outcome = tracker.process_frame(2, &dets(&["phone"])).unwrap();
        let retried: Vec<_> = outcome.emitted.iter().map(|e| e.label()).collect();
        assert_eq!(retried, vec!["cup", "laptop"]);
        assert_eq!(sink.labels(), vec!["book", "cup", "laptop"]);
    }

    #[test]
    fn test_partial_flush_reports_recorded_events() {
        let (mut tracker, sink) = tracker(5);
        tracker.process_frame(0, &dets(&["book", "cup", "laptop"])).unwrap();

        sink.fail_after(1, 1);
        let err = tracker.flush_all().unwrap_err();

        assert!(err.outcome.appeared.is_empty());
        assert_eq!(err.outcome.emitted.len(), 1);
        assert_eq!(err.outcome.emitted[0].label(), "book");
        assert_eq!(tracker.len(), 2);
        assert!(tracker.get("book").is_none());

        assert_eq!(tracker.flush_all().unwrap().len(), 2);
        assert_eq!(sink.labels(), vec!["book", "cup", "laptop"]);
    }

    #[test]
    fn test_duplicate_detections_in_frame_count_once() {
        let (mut tracker, _) = tracker(5);
        tracker.process_frame(0, &dets(&["cup", "cup", "cup"])).unwrap();
        tracker.process_frame(1, &dets(&["cup", "cup"])).unwrap();

        assert_eq!(tracker.get("cup").unwrap().observed_frame_count(), 2);
    }

    #[test]
    fn test_redetection_on_expiry_frame_keeps_state() {
        let (mut tracker, sink) = tracker(2);
        tracker.process_frame(0, &dets(&["cup"])).unwrap();

        let outcome = tracker.process_frame(3, &dets(&["cup"])).unwrap();

        assert!(outcome.emitted.is_empty());
        assert!(sink.is_empty());
        let state = tracker.get("cup").unwrap();
        assert_eq!(state.observed_frame_count(), 2);
        assert_eq!(state.first_seen(), 0);
    }

    #[test]
    fn test_zero_window_evicts_on_first_missed_frame() {
        let (mut tracker, sink) = tracker(0);
        tracker.process_frame(0, &dets(&["cup"])).unwrap();
        let outcome = tracker.process_frame(1, &dets(&[])).unwrap();

        assert_eq!(outcome.emitted.len(), 1);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_label_cycles_produce_separate_events() {
        let (mut tracker, sink) = tracker(1);
        let frames: &[&[&str]] = &[&["cup"], &["cup"], &[], &[], &["cup"], &[], &[]];

        let events = run(&mut tracker, frames);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].observed_frames(), 2);
        assert_eq!(events[1].observed_frames(), 1);
        assert_eq!(events[1].first_seen(), 4);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_event_count_matches_intervals() {
        // Window 1: a gap of two or more frames closes an interval.
        let (mut tracker, sink) = tracker(1);
        let frames: &[&[&str]] = &[
            &["cup", "book"],
            &["cup"],
            &["book"],
            &[],
            &[],
            &["cup"],
            &["cup", "book"],
            &[],
            &["book"],
            &[],
            &[],
            &[],
        ];

        run(&mut tracker, frames);
        tracker.flush_all().unwrap();

        // cup: [0,1] [5,6]; book: [0,2] [6,8]
        let labels = sink.labels();
        assert_eq!(labels.iter().filter(|l| *l == "cup").count(), 2);
        assert_eq!(labels.iter().filter(|l| *l == "book").count(), 2);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_stale_frame_does_not_double_count() {
        let (mut tracker, _) = tracker(5);
        tracker.process_frame(4, &dets(&["cup"])).unwrap();
        tracker.process_frame(4, &dets(&["cup"])).unwrap();

        assert_eq!(tracker.get("cup").unwrap().observed_frame_count(), 1);
    }
}
