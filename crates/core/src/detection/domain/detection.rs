use crate::shared::bbox::BoundingBox;

/// Identifier the tracker assigns to a continuously tracked face.
///
/// Stable only while the face stays tracked; the tracker may hand the same
/// number to a different face after losing the first one.
pub type TrackId = u32;

/// One tracked face reported for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub track_id: TrackId,
    pub bbox: BoundingBox,
    pub center: (i32, i32),
}

impl Detection {
    pub fn new(track_id: TrackId, bbox: BoundingBox) -> Self {
        Self {
            track_id,
            bbox,
            center: bbox.center(),
        }
    }
}
