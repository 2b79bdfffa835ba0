//! 5-point face landmarks as emitted by the pose-head face detector.
//!
//! Order: left eye, right eye, nose, left mouth corner, right mouth corner.

use crate::shared::bbox::BoundingBox;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceLandmarks {
    /// Points below the keypoint confidence floor are stored as `None`.
    points: [Option<(f64, f64)>; 5],
}

impl FaceLandmarks {
    pub fn new(points: [Option<(f64, f64)>; 5]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Option<(f64, f64)>; 5] {
        &self.points
    }

    /// All five points, or `None` when any of them was not confidently seen.
    /// Alignment needs the full set.
    pub fn complete(&self) -> Option<[(f64, f64); 5]> {
        let mut out = [(0.0, 0.0); 5];
        for (slot, point) in out.iter_mut().zip(self.points.iter()) {
            *slot = (*point)?;
        }
        Some(out)
    }
}

/// A face found by a [`FaceLocator`](super::face_detector::FaceLocator).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocatedFace {
    pub bbox: BoundingBox,
    pub landmarks: Option<FaceLandmarks>,
}
