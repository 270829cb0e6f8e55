use std::fs;
use std::path::{Path, PathBuf};

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;
use crate::video::domain::source_metadata::SourceMetadata;
use crate::video::domain::video_reader::{VideoError, VideoReader};

/// Treats a directory of still images (file names in natural order, so
/// `frame_2.png` plays before `frame_10.png`) or a single image
/// file as a video with unknown frame rate.
///
/// Images are decoded lazily with the `image` crate; all images must share
/// the size of the first one.
pub struct ImageSequenceReader {
    paths: Vec<PathBuf>,
    size: (u32, u32),
}

impl ImageSequenceReader {
    pub fn new() -> Self {
        Self {
            paths: Vec::new(),
            size: (0, 0),
        }
    }

    pub fn is_image_file(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    fn list_images(dir: &Path) -> Result<Vec<PathBuf>, VideoError> {
        let entries = fs::read_dir(dir).map_err(|e| VideoError::Open {
            source_name: dir.display().to_string(),
            message: e.to_string(),
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && Self::is_image_file(p))
            .collect();
        paths.sort_by_cached_key(|p| natural_key(p));
        Ok(paths)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum NameChunk {
    /// Digit run without leading zeros, ordered by length then digits.
    Number(usize, String),
    Text(String),
}

/// Orders file names so digit runs compare by value: `frame_2.png` sorts
/// before `frame_10.png`.
fn natural_key(path: &Path) -> Vec<NameChunk> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut chunks = Vec::new();
    let mut chars = name.chars().peekable();
    while let Some(&c) = chars.peek() {
        let digit = c.is_ascii_digit();
        let mut run = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() != digit {
                break;
            }
            run.push(c);
            chars.next();
        }
        if digit {
            let value = run.trim_start_matches('0').to_string();
            chunks.push(NameChunk::Number(value.len(), value));
        } else {
            chunks.push(NameChunk::Text(run));
        }
    }
    chunks
}

impl Default for ImageSequenceReader {
    fn default() -> Self {
        Self::new()
    }
}

fn load_rgb(path: &Path) -> Result<image::RgbImage, VideoError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| VideoError::Image {
            path: path.to_path_buf(),
            source,
        })
}

impl VideoReader for ImageSequenceReader {
    fn open(&mut self, source: &str) -> Result<SourceMetadata, VideoError> {
        let path = Path::new(source);
        let paths = if path.is_dir() {
            Self::list_images(path)?
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            return Err(VideoError::Open {
                source_name: source.to_string(),
                message: "not an image file or directory".into(),
            });
        };

        let Some(first) = paths.first() else {
            return Err(VideoError::EmptySequence(path.to_path_buf()));
        };
        let (width, height) = image::image_dimensions(first).map_err(|source| {
            VideoError::Image {
                path: first.clone(),
                source,
            }
        })?;
        let codec = first
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        log::debug!("Opened {} image(s) from {source}", paths.len());
        let metadata = SourceMetadata {
            width,
            height,
            fps: 0.0,
            total_frames: paths.len(),
            codec,
            source: source.to_string(),
        };
        self.paths = paths;
        self.size = (width, height);
        Ok(metadata)
    }

    fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame, VideoError>> + '_> {
        if self.paths.is_empty() {
            return Box::new(std::iter::once(Err(VideoError::NotOpened)));
        }
        let expected = self.size;
        Box::new(self.paths.iter().enumerate().map(move |(index, path)| {
            let image = load_rgb(path)?;
            let actual = image.dimensions();
            if actual != expected {
                return Err(VideoError::SizeMismatch {
                    path: path.clone(),
                    expected,
                    actual,
                });
            }
            Ok(Frame::from_rgb_image(image, index))
        }))
    }

    fn close(&mut self) {
        self.paths.clear();
    }
}
