use crate::shared::frame::Frame;

use super::detection::Detection;
use super::face_landmarks::LocatedFace;

/// Domain interface for face detection with tracking.
///
/// Implementations are stateful (track ids persist across frames),
/// hence `&mut self`. The returned track ids are unique within one call.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>>;
}

/// Stateless single-image face localisation, used to find the face inside
/// an already cropped region.
pub trait FaceLocator: Send {
    /// Highest-confidence face in `frame`, if any, with landmarks when the
    /// model provides them.
    fn locate(&mut self, frame: &Frame)
        -> Result<Option<LocatedFace>, Box<dyn std::error::Error>>;
}
