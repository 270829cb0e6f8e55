use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use presence_scanner_core::detection::domain::detection_filter::DetectionFilter;
use presence_scanner_core::detection::domain::object_detector::ObjectDetector;
use presence_scanner_core::detection::infrastructure::onnx_yolo_detector::{
    OnnxYoloDetector, DEFAULT_MIN_CONFIDENCE,
};
use presence_scanner_core::detection::infrastructure::replay_detector::ReplayDetector;
use presence_scanner_core::events::domain::event_sink::EventSink;
use presence_scanner_core::events::infrastructure::csv_event_sink::CsvEventSink;
use presence_scanner_core::pipeline::scan_logger::LogScanLogger;
use presence_scanner_core::pipeline::scan_video_use_case::{ScanSummary, ScanVideoUseCase};
use presence_scanner_core::shared::constants::{DEFAULT_EVENTS_FILE, DEFAULT_MODEL_NAME};
use presence_scanner_core::shared::model_resolver;
use presence_scanner_core::shared::scanner_config::{ConfigError, ScannerConfig};
use presence_scanner_core::tracking::domain::presence_tracker::{PresenceTracker, TrackerConfig};
use presence_scanner_core::video::domain::video_reader::VideoReader;
use presence_scanner_core::video::infrastructure::ffmpeg_reader::FfmpegReader;
use presence_scanner_core::video::infrastructure::image_sequence_reader::ImageSequenceReader;

/// Watches a video for everyday objects and logs how long each stayed in view.
#[derive(Parser)]
#[command(name = "presence-scanner")]
struct Cli {
    /// Input video file, stream URL, image file or directory of images.
    input: String,

    /// CSV file receiving one row per sighting.
    #[arg(short, long, default_value = DEFAULT_EVENTS_FILE)]
    output: PathBuf,

    /// Append to an existing CSV instead of replacing it.
    #[arg(long)]
    append: bool,

    /// JSON config file; individual flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Object labels to watch for (comma-separated COCO names).
    #[arg(long, value_delimiter = ',')]
    allow_list: Option<Vec<String>>,

    /// Minimum confidence for a detection to count (0.0-1.0, exclusive).
    #[arg(long)]
    confidence: Option<f32>,

    /// Run detection on every Nth frame (1 = every frame).
    #[arg(long)]
    frame_skip: Option<usize>,

    /// Sampled frames an object may go undetected before it is logged as gone.
    #[arg(long)]
    persistence_window: Option<u64>,

    /// Frame rate used to turn observed frame counts into seconds.
    #[arg(long)]
    frame_rate: Option<f64>,

    /// ONNX detection model: a path, or a file name looked up in the
    /// working directory and the model cache.
    #[arg(long, default_value = DEFAULT_MODEL_NAME)]
    model: PathBuf,

    /// Where to download the model from when it is not found locally.
    #[arg(long)]
    model_url: Option<String>,

    /// Confidence below which raw model outputs are dropped before NMS.
    #[arg(long, default_value_t = DEFAULT_MIN_CONFIDENCE)]
    min_confidence: f32,

    /// Replay recorded detections (JSON lines) instead of running a model.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let detector = build_detector(&cli)?;

    let mut reader = open_reader(&cli.input);
    let metadata = reader.open(&cli.input)?;
    log::info!(
        "Opened {} ({}x{}, {:.2} fps, codec {})",
        metadata.source,
        metadata.width,
        metadata.height,
        metadata.fps,
        metadata.codec
    );

    let sink: Box<dyn EventSink> = if cli.append {
        Box::new(CsvEventSink::open_append(&cli.output)?)
    } else {
        Box::new(CsvEventSink::create(&cli.output)?)
    };
    let tracker = PresenceTracker::new(TrackerConfig::from_scanner_config(&config)?, sink);

    let total = metadata.total_frames;
    let mut use_case = ScanVideoUseCase::new(
        reader,
        detector,
        DetectionFilter::from_config(&config),
        tracker,
        Box::new(LogScanLogger::default()),
    )
    .with_total_frames(total)
    .with_progress(move |current, _| {
        if total > 0 {
            eprint!("\rScanning frame {current}/{total}");
        } else {
            eprint!("\rScanning frame {current}");
        }
        true
    })
    .with_frame_report(|report| {
        if !report.detections.is_empty() {
            log::debug!(
                "Frame {}: {}",
                report.source_index(),
                report.captions().join(", ")
            );
        }
    });

    let summary = use_case.execute(config.frame_skip)?;
    eprintln!();
    print_summary(&summary, &cli.output);
    Ok(())
}

/// Defaults, then the config file, then individual flags.
fn build_config(cli: &Cli) -> Result<ScannerConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => ScannerConfig::load(path)?,
        None => ScannerConfig::default(),
    };

    if let Some(labels) = &cli.allow_list {
        config.allow_list = labels
            .iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
    }
    if let Some(confidence) = cli.confidence {
        config.confidence_threshold = confidence;
    }
    if let Some(frame_skip) = cli.frame_skip {
        config.frame_skip = frame_skip;
    }
    if let Some(window) = cli.persistence_window {
        config.persistence_window = window;
    }
    if let Some(rate) = cli.frame_rate {
        config.assumed_frame_rate = rate;
    }

    config.validate()?;
    Ok(config)
}

fn build_detector(cli: &Cli) -> Result<Box<dyn ObjectDetector>, Box<dyn std::error::Error>> {
    if let Some(replay) = &cli.replay {
        let detector = ReplayDetector::from_jsonl(replay)?;
        log::info!(
            "Replaying detections for {} frame(s) from {}",
            detector.recorded_frames(),
            replay.display()
        );
        return Ok(Box::new(detector));
    }

    let model_path = resolve_model(cli)?;
    log::info!("Loading model {}", model_path.display());
    Ok(Box::new(OnnxYoloDetector::new(
        &model_path,
        cli.min_confidence,
    )?))
}

fn resolve_model(cli: &Cli) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if cli.model.components().count() > 1 || cli.model.is_absolute() {
        if !cli.model.exists() {
            return Err(format!("Model file not found: {}", cli.model.display()).into());
        }
        return Ok(cli.model.clone());
    }

    let name = cli
        .model
        .to_str()
        .ok_or_else(|| format!("Invalid model name: {}", cli.model.display()))?;
    let cwd = std::env::current_dir().ok();
    let path = model_resolver::resolve(
        name,
        cwd.as_deref(),
        cli.model_url.as_deref(),
        Some(Box::new(download_progress)),
    )?;
    Ok(path)
}

fn open_reader(input: &str) -> Box<dyn VideoReader> {
    let path = Path::new(input);
    if path.is_dir() || ImageSequenceReader::is_image_file(path) {
        Box::new(ImageSequenceReader::new())
    } else {
        Box::new(FfmpegReader::new())
    }
}

fn print_summary(summary: &ScanSummary, output: &Path) {
    if summary.cancelled {
        println!("Scan cancelled.");
    }
    println!("Frames read:       {}", summary.frames_read);
    println!("Frames sampled:    {}", summary.frames_sampled);
    println!("Detector failures: {}", summary.detector_failures);
    println!("Events recorded:   {}", summary.events_emitted);
    println!("Events written to {}", output.display());
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading detection model... {pct}%");
    } else {
        eprint!("\rDownloading detection model... {downloaded} bytes");
    }
}
