use std::fs;
use std::path::Path;

use presence_scanner_core::detection::domain::detection_filter::DetectionFilter;
use presence_scanner_core::detection::infrastructure::replay_detector::ReplayDetector;
use presence_scanner_core::events::infrastructure::csv_event_sink::CsvEventSink;
use presence_scanner_core::pipeline::scan_logger::NullScanLogger;
use presence_scanner_core::pipeline::scan_video_use_case::ScanVideoUseCase;
use presence_scanner_core::shared::scanner_config::ScannerConfig;
use presence_scanner_core::tracking::domain::presence_tracker::{PresenceTracker, TrackerConfig};
use presence_scanner_core::video::domain::video_reader::VideoReader;
use presence_scanner_core::video::infrastructure::image_sequence_reader::ImageSequenceReader;
use tempfile::TempDir;

fn write_frames(dir: &Path, count: usize) {
    for i in 0..count {
        image::RgbImage::from_pixel(8, 6, image::Rgb([i as u8, 0, 0]))
            .save(dir.join(format!("frame_{i:04}.png")))
            .unwrap();
    }
}

fn replay_line(frame: usize, detections: &[(&str, f32)]) -> String {
    let items: Vec<String> = detections
        .iter()
        .map(|(label, confidence)| {
            format!(r#"{{"label": "{label}", "confidence": {confidence}, "bbox": [0, 0, 4, 4]}}"#)
        })
        .collect();
    format!(r#"{{"frame": {frame}, "detections": [{}]}}"#, items.join(", "))
}

fn scan(frames_dir: &Path, replay: &Path, csv: &Path, config: &ScannerConfig) -> String {
    let mut reader = ImageSequenceReader::new();
    let metadata = reader.open(&frames_dir.to_string_lossy()).unwrap();

    let tracker = PresenceTracker::new(
        TrackerConfig::from_scanner_config(config).unwrap(),
        Box::new(CsvEventSink::create(csv).unwrap()),
    );
    let mut use_case = ScanVideoUseCase::new(
        Box::new(reader),
        Box::new(ReplayDetector::from_jsonl(replay).unwrap()),
        DetectionFilter::from_config(config),
        tracker,
        Box::new(NullScanLogger),
    )
    .with_total_frames(metadata.total_frames);

    let summary = use_case.execute(config.frame_skip).unwrap();
    assert_eq!(summary.frames_read, metadata.total_frames);
    assert!(use_case.tracker().is_empty());

    fs::read_to_string(csv).unwrap()
}

#[test]
fn test_image_sequence_to_csv() {
    let dir = TempDir::new().unwrap();
    let frames = dir.path().join("frames");
    fs::create_dir(&frames).unwrap();
    write_frames(&frames, 20);

    // cup in view for source frames 0..6, a laptop below threshold, a person
    // (not allow-listed) throughout, and a book at the very end.
    let mut lines = Vec::new();
    for i in 0..20 {
        let mut dets = vec![("person", 0.95)];
        if i < 6 {
            dets.push(("cup", 0.9));
        }
        if i == 3 {
            dets.push(("laptop", 0.6));
        }
        if i >= 18 {
            dets.push(("book", 0.8));
        }
        lines.push(replay_line(i, &dets));
    }
    let replay = dir.path().join("replay.jsonl");
    fs::write(&replay, lines.join("\n")).unwrap();

    let config = ScannerConfig {
        frame_skip: 1,
        ..ScannerConfig::default()
    };
    let csv = scan(&frames, &replay, &dir.path().join("out.csv"), &config);

    let rows: Vec<&str> = csv.lines().collect();
    assert_eq!(rows[0], "Timestamp,Object,Duration_Seconds");
    assert_eq!(rows.len(), 3);
    assert!(rows[1].ends_with(",cup,0.20"), "{}", rows[1]);
    assert!(rows[2].ends_with(",book,0.07"), "{}", rows[2]);
}

#[test]
fn test_frame_skip_halves_observed_frames() {
    let dir = TempDir::new().unwrap();
    let frames = dir.path().join("frames");
    fs::create_dir(&frames).unwrap();
    write_frames(&frames, 12);

    let lines: Vec<String> = (0..12).map(|i| replay_line(i, &[("bottle", 0.9)])).collect();
    let replay = dir.path().join("replay.jsonl");
    fs::write(&replay, lines.join("\n")).unwrap();

    let config = ScannerConfig::default();
    let csv = scan(&frames, &replay, &dir.path().join("out.csv"), &config);

    let rows: Vec<&str> = csv.lines().collect();
    assert_eq!(rows.len(), 2);
    // 6 of 12 frames sampled at frame_skip 2.
    assert!(rows[1].ends_with(",bottle,0.20"), "{}", rows[1]);
}
