//! Multi-class YOLOv8 object detector using ONNX Runtime via `ort`.
//!
//! Handles letterbox preprocessing, inference, per-class NMS and mapping of
//! class indices to label names. Confidence filtering against the scanner's
//! allow-list happens downstream in `DetectionFilter`; the floor applied here
//! only discards anchors that could never pass.
use std::path::Path;

use crate::detection::domain::detection::Detection;
use crate::detection::domain::object_detector::{DetectionError, ObjectDetector};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::COCO_CLASS_NAMES;
use crate::shared::frame::Frame;

use super::execution_provider::platform_execution_providers;

/// Fallback model input resolution when the model doesn't declare one.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Anchors scoring below this never reach the filter.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.25;

const NMS_IOU_THRESH: f64 = 0.45;

/// Values preceding the class scores in each anchor row: cx, cy, w, h.
const BOX_VALUES: usize = 4;

pub struct OnnxYoloDetector {
    session: ort::session::Session,
    class_names: Vec<String>,
    min_confidence: f32,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Loads a YOLOv8 detection model exported to ONNX with COCO class order.
    pub fn new(model_path: &Path, min_confidence: f32) -> Result<Self, DetectionError> {
        let session = ort::session::Session::builder()
            .map_err(|e| load_error(model_path, e))?
            .with_execution_providers(platform_execution_providers())
            .map_err(|e| load_error(model_path, e))?
            .commit_from_file(model_path)
            .map_err(|e| load_error(model_path, e))?;

        // NCHW: [1, 3, H, W]; dynamic dimensions are reported as -1.
        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { ref shape, .. }
                    if shape.len() >= 4 && shape[2] > 0 =>
                {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::debug!(
            "Loaded detection model {} (input {input_size}x{input_size})",
            model_path.display()
        );

        Ok(Self {
            session,
            class_names: COCO_CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            min_confidence,
            input_size,
        })
    }

    pub fn with_class_names(mut self, class_names: Vec<String>) -> Self {
        self.class_names = class_names;
        self
    }
}

impl ObjectDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        let (input_tensor, transform) = letterbox(frame, self.input_size)?;

        let input_value = ort::value::Tensor::from_array(input_tensor)
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        if outputs.len() == 0 {
            return Err(DetectionError::Output("model produced no outputs".into()));
        }
        let tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| DetectionError::Output(e.to_string()))?;
        let shape = tensor.shape().to_vec();
        let data = tensor
            .as_slice()
            .ok_or_else(|| DetectionError::Output("output tensor is not contiguous".into()))?;

        let layout = OutputLayout::from_shape(&shape)?;
        let mut candidates = decode_candidates(data, &layout, self.min_confidence);
        let kept = nms_per_class(&mut candidates, NMS_IOU_THRESH);

        Ok(kept
            .into_iter()
            .map(|c| {
                let label = self
                    .class_names
                    .get(c.class_id)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{}", c.class_id));
                let (x1, y1, x2, y2) = transform.to_frame_coords(c.corners);
                let bbox = BoundingBox::from_corners_clamped(
                    x1,
                    y1,
                    x2,
                    y2,
                    frame.width(),
                    frame.height(),
                );
                Detection::new(label, c.confidence, bbox)
            })
            .collect())
    }
}

fn load_error(path: &Path, e: impl std::fmt::Display) -> DetectionError {
    DetectionError::ModelLoad {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Maps letterbox pixel coordinates back onto the source frame.
struct LetterboxTransform {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl LetterboxTransform {
    fn to_frame_coords(&self, (x1, y1, x2, y2): (f64, f64, f64, f64)) -> (f64, f64, f64, f64) {
        let px = self.pad_x as f64;
        let py = self.pad_y as f64;
        (
            (x1 - px) / self.scale,
            (y1 - py) / self.scale,
            (x2 - px) / self.scale,
            (y2 - py) / self.scale,
        )
    }
}

/// Scales a frame into a `target_size` square, padding with YOLO grey (114).
fn letterbox(
    frame: &Frame,
    target_size: u32,
) -> Result<(ndarray::Array4<f32>, LetterboxTransform), DetectionError> {
    let src = frame
        .as_ndarray()
        .ok_or_else(|| DetectionError::Inference("frame buffer does not match its size".into()))?;
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    if src_h == 0 || src_w == 0 {
        return Err(DetectionError::Inference("empty frame".into()));
    }

    let target = target_size as f64;
    let scale = (target / src_w as f64).min(target / src_h as f64);
    let new_w = ((src_w as f64 * scale).round() as u32).min(target_size);
    let new_h = ((src_h as f64 * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    // Nearest-neighbour resample into the padded area.
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    Ok((
        tensor,
        LetterboxTransform {
            scale,
            pad_x,
            pad_y,
        },
    ))
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

/// YOLOv8 emits `[1, 4 + classes, anchors]`; some exports transpose it.
#[derive(Debug, PartialEq)]
struct OutputLayout {
    anchors: usize,
    features: usize,
    transposed: bool,
}

impl OutputLayout {
    fn from_shape(shape: &[usize]) -> Result<Self, DetectionError> {
        if shape.len() != 3 {
            return Err(DetectionError::Output(format!(
                "expected a rank-3 output, got shape {shape:?}"
            )));
        }
        let transposed = shape[1] < shape[2];
        let (anchors, features) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        if features <= BOX_VALUES {
            return Err(DetectionError::Output(format!(
                "output rows carry no class scores: shape {shape:?}"
            )));
        }
        Ok(Self {
            anchors,
            features,
            transposed,
        })
    }

    fn value(&self, data: &[f32], anchor: usize, feature: usize) -> f32 {
        if self.transposed {
            data[feature * self.anchors + anchor]
        } else {
            data[anchor * self.features + feature]
        }
    }
}

#[derive(Clone, Debug)]
struct Candidate {
    /// Corners in letterbox pixel space.
    corners: (f64, f64, f64, f64),
    confidence: f32,
    class_id: usize,
}

impl Candidate {
    fn iou(&self, other: &Candidate) -> f64 {
        let (ax1, ay1, ax2, ay2) = self.corners;
        let (bx1, by1, bx2, by2) = other.corners;
        let inter = (ax2.min(bx2) - ax1.max(bx1)).max(0.0) * (ay2.min(by2) - ay1.max(by1)).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let area_a = (ax2 - ax1) * (ay2 - ay1);
        let area_b = (bx2 - bx1) * (by2 - by1);
        inter / (area_a + area_b - inter)
    }
}

fn decode_candidates(data: &[f32], layout: &OutputLayout, min_confidence: f32) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for anchor in 0..layout.anchors {
        let best = (BOX_VALUES..layout.features)
            .map(|f| (f - BOX_VALUES, layout.value(data, anchor, f)))
            .fold(None, |best: Option<(usize, f32)>, (id, score)| match best {
                Some((_, s)) if s >= score => best,
                _ => Some((id, score)),
            });
        let Some((class_id, confidence)) = best else {
            continue;
        };
        if confidence < min_confidence {
            continue;
        }

        let cx = layout.value(data, anchor, 0) as f64;
        let cy = layout.value(data, anchor, 1) as f64;
        let w = layout.value(data, anchor, 2) as f64;
        let h = layout.value(data, anchor, 3) as f64;
        candidates.push(Candidate {
            corners: (cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
            confidence,
            class_id,
        });
    }
    candidates
}

/// Greedy NMS that only lets boxes of the same class suppress each other.
fn nms_per_class(candidates: &mut [Candidate], iou_thresh: f64) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; candidates.len()];
    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(candidates[i].clone());
        for j in (i + 1)..candidates.len() {
            if !suppressed[j]
                && candidates[j].class_id == candidates[i].class_id
                && candidates[i].iou(&candidates[j]) > iou_thresh
            {
                suppressed[j] = true;
            }
        }
    }
    keep
}
