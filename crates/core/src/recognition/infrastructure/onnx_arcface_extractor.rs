/// ArcFace embedding extractor using ONNX Runtime.
///
/// The incoming crop is a smoothed tracker box, so the face is first
/// re-located inside it; when that fails the crop is padded with black and
/// searched again before giving up. A face whose five landmarks were all
/// seen is warped onto the ArcFace template before embedding; otherwise its
/// box is cut out and resized.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::domain::face_detector::FaceLocator;
use crate::detection::domain::face_landmarks::LocatedFace;
use crate::detection::infrastructure::execution_provider::execution_providers;
use crate::recognition::domain::embedding::l2_normalize;
use crate::recognition::domain::embedding_extractor::{EmbeddingExtractor, Extraction};
use crate::recognition::infrastructure::face_alignment::align_face;
use crate::shared::bbox::BoundingBox;
use crate::shared::frame::Frame;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct OnnxArcFaceExtractor {
    session: Mutex<ort::session::Session>,
    locator: Mutex<Box<dyn FaceLocator>>,
}

impl OnnxArcFaceExtractor {
    pub fn new(
        model_path: &Path,
        use_gpu: bool,
        locator: Box<dyn FaceLocator>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let intra_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session = ort::session::Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_inter_threads(1)?
            .with_intra_threads(intra_threads)?
            .with_execution_providers(execution_providers(use_gpu))?
            .commit_from_file(model_path)?;
        log::info!("Loaded embedding model {}", model_path.display());
        Ok(Self {
            session: Mutex::new(session),
            locator: Mutex::new(locator),
        })
    }

    /// Face region inside `crop`, searching a black-padded copy as fallback.
    fn locate_face(&self, crop: &Frame) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let mut locator = self
            .locator
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;

        if let Some(face) = locator.locate(crop)?.and_then(|f| face_image(crop, &f)) {
            return Ok(Some(face));
        }

        let pad = crop.width().max(crop.height()) / 2;
        let padded = crop.pad(pad);
        log::debug!(
            "No face in {}x{} crop, retrying with {pad}px padding",
            crop.width(),
            crop.height()
        );
        Ok(locator
            .locate(&padded)?
            .and_then(|f| face_image(&padded, &f)))
    }

    fn embed(&self, face: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        let tensor = preprocess(face);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?;

        let mut embedding = embedding_slice.to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

impl EmbeddingExtractor for OnnxArcFaceExtractor {
    fn extract(&self, face: &Frame) -> Result<Extraction, Box<dyn std::error::Error>> {
        match self.locate_face(face)? {
            Some(aligned) => Ok(Extraction::Embedding(self.embed(&aligned)?)),
            None => Ok(Extraction::NoFaceFound),
        }
    }
}

fn face_image(frame: &Frame, located: &LocatedFace) -> Option<Frame> {
    located
        .landmarks
        .and_then(|l| l.complete())
        .and_then(|points| align_face(frame, &points))
        .or_else(|| cut(frame, &located.bbox))
}

fn cut(frame: &Frame, bbox: &BoundingBox) -> Option<Frame> {
    let rect = bbox.crop_window(frame.width(), frame.height())?;
    frame.crop(&rect)
}

/// Resize crop to 112x112, normalize, NCHW layout.
fn preprocess(face: &Frame) -> ndarray::Array4<f32> {
    let src_w = face.width() as usize;
    let src_h = face.height() as usize;
    let src = face.as_ndarray();

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    if src_w == 0 || src_h == 0 {
        return tensor;
    }

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (src[[src_y, src_x, c]] as f32 - NORM_MEAN) / NORM_STD;
            }
        }
    }

    tensor
}
