/// YOLO face detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference and NMS. Track ids come from
/// ByteTrack layered on top; the same model also serves as a single-shot
/// face locator for the embedding extractor's alignment step.
use std::path::Path;

use crate::detection::domain::detection::Detection;
use crate::detection::domain::face_detector::{FaceDetector, FaceLocator};
use crate::detection::domain::face_landmarks::{FaceLandmarks, LocatedFace};
use crate::shared::bbox::BoundingBox;
use crate::shared::frame::Frame;

use super::bytetrack_tracker::{ByteTracker, ScoredBox};
use super::execution_provider::execution_providers;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Keypoint values per detection (5 landmarks × x, y, conf).
const NUM_KEYPOINT_VALUES: usize = 15;

/// Minimum keypoint confidence to treat a landmark as visible.
const KEYPOINT_CONF_THRESH: f64 = 0.5;

/// Boxes below the detector floor but above this still feed ByteTrack's
/// second association stage.
const TRACKER_CANDIDATE_FLOOR: f64 = 0.1;

/// ONNX session plus the letterbox geometry it expects.
pub struct YoloFaceModel {
    session: ort::session::Session,
    input_size: u32,
}

impl YoloFaceModel {
    /// Load a YOLO ONNX model. The input resolution is read from the model's
    /// NCHW input shape, falling back to 640 when dynamic.
    pub fn load(model_path: &Path, use_gpu: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(execution_providers(use_gpu))?
            .commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    (shape.len() >= 4 && shape[2] > 0).then(|| shape[2] as u32)
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::info!(
            "Loaded face model {} (input {input_size}px)",
            model_path.display()
        );
        Ok(Self {
            session,
            input_size,
        })
    }

    /// Runs the model and returns NMS-filtered boxes scoring at least
    /// `min_confidence`, in frame coordinates.
    pub fn infer(
        &mut self,
        frame: &Frame,
        min_confidence: f64,
    ) -> Result<Vec<ScoredBox>, Box<dyn std::error::Error>> {
        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
        let boxes = decode_rows(data, &shape, scale, pad_x, pad_y, min_confidence)?;
        Ok(nms(boxes, NMS_IOU_THRESH))
    }
}

/// Production detector/tracker: YOLO inference followed by ByteTrack.
pub struct OnnxYoloDetector {
    model: YoloFaceModel,
    tracker: ByteTracker,
}

impl OnnxYoloDetector {
    /// `tracker` should be built with the detector confidence floor as its
    /// high-confidence threshold.
    pub fn new(model: YoloFaceModel, tracker: ByteTracker) -> Self {
        Self { model, tracker }
    }
}

impl FaceDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        let boxes = self.model.infer(frame, TRACKER_CANDIDATE_FLOOR)?;
        Ok(self.tracker.update(&boxes))
    }
}

/// Finds the single most confident face in a crop.
pub struct YoloFaceLocator {
    model: YoloFaceModel,
    confidence: f64,
}

impl YoloFaceLocator {
    pub fn new(model: YoloFaceModel, confidence: f64) -> Self {
        Self { model, confidence }
    }
}

impl FaceLocator for YoloFaceLocator {
    fn locate(
        &mut self,
        frame: &Frame,
    ) -> Result<Option<LocatedFace>, Box<dyn std::error::Error>> {
        // NMS output is already sorted by descending score.
        let boxes = self.model.infer(frame, self.confidence)?;
        Ok(boxes.first().map(|b| LocatedFace {
            bbox: b.bbox,
            landmarks: b.landmarks,
        }))
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padded with 114/255 gray, YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

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

    (tensor, scale, pad_x, pad_y)
}

/// Decodes raw YOLO output rows into scored boxes in frame coordinates.
///
/// Accepts `[1, features, detections]` or `[1, detections, features]`.
/// Keypoints are read when the row carries the 15 pose values.
fn decode_rows(
    data: &[f32],
    shape: &[usize],
    scale: f64,
    pad_x: u32,
    pad_y: u32,
    min_confidence: f64,
) -> Result<Vec<ScoredBox>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }

    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 {
        return Err(format!("YOLO output has too few features: {num_feats}").into());
    }

    let feature = |det: usize, f: usize| -> f64 {
        if transposed {
            data[f * num_dets + det] as f64
        } else {
            data[det * num_feats + f] as f64
        }
    };

    // Row layout: [cx, cy, w, h, conf, keypoints...]
    let has_keypoints = num_feats >= 5 + NUM_KEYPOINT_VALUES;
    let unletterbox = |v: f64, pad: u32| (v - pad as f64) / scale;
    let mut boxes = Vec::new();
    for i in 0..num_dets {
        let score = feature(i, 4);
        if score < min_confidence {
            continue;
        }
        let (cx, cy, w, h) = (feature(i, 0), feature(i, 1), feature(i, 2), feature(i, 3));
        let landmarks = has_keypoints.then(|| {
            FaceLandmarks::new(std::array::from_fn(|k| {
                let base = 5 + k * 3;
                (feature(i, base + 2) >= KEYPOINT_CONF_THRESH).then(|| {
                    (
                        unletterbox(feature(i, base), pad_x),
                        unletterbox(feature(i, base + 1), pad_y),
                    )
                })
            }))
        });
        boxes.push(ScoredBox {
            bbox: BoundingBox::new(
                unletterbox(cx - w / 2.0, pad_x),
                unletterbox(cy - h / 2.0, pad_y),
                unletterbox(cx + w / 2.0, pad_x),
                unletterbox(cy + h / 2.0, pad_y),
            ),
            score,
            landmarks,
        });
    }
    Ok(boxes)
}

/// Greedy NMS: sort by score descending, suppress overlapping boxes.
fn nms(mut boxes: Vec<ScoredBox>, iou_thresh: f64) -> Vec<ScoredBox> {
    boxes.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<ScoredBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if keep.iter().all(|k| k.bbox.iou(&candidate.bbox) <= iou_thresh) {
            keep.push(candidate);
        }
    }
    keep
}
