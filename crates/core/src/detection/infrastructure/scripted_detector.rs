use std::collections::HashMap;
use std::sync::Arc;

use crate::detection::domain::detection::Detection;
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::frame::Frame;

/// Replays pre-recorded detections keyed by frame index.
///
/// Stands in for the ONNX detector in tests and offline replays, so the
/// resolver and loop can be driven frame by frame with known track ids.
pub struct ScriptedDetector {
    script: Arc<HashMap<usize, Vec<Detection>>>,
}

impl ScriptedDetector {
    pub fn new(script: Arc<HashMap<usize, Vec<Detection>>>) -> Self {
        Self { script }
    }
}

impl FaceDetector for ScriptedDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        Ok(self.script.get(&frame.index()).cloned().unwrap_or_default())
    }
}
