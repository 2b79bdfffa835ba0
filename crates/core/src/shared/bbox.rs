use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates, `x1 < x2`, `y1 < y2`.
///
/// Coordinates stay floating point so repeated smoothing does not
/// accumulate truncation error; conversion to whole pixels happens only
/// when a region is cut out of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// Integer pixel window inside a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_array(coords: [f64; 4]) -> Self {
        Self::new(coords[0], coords[1], coords[2], coords[3])
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Integer center point, truncated toward zero.
    pub fn center(&self) -> (i32, i32) {
        (
            ((self.x1 + self.x2) / 2.0) as i32,
            ((self.y1 + self.y2) / 2.0) as i32,
        )
    }

    /// Restricts every coordinate to `[0, width] x [0, height]`.
    pub fn clamp_to(&self, width: u32, height: u32) -> BoundingBox {
        let w = width as f64;
        let h = height as f64;
        BoundingBox {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }

    /// Whole-pixel window covered by this box, or `None` when it has no area.
    ///
    /// The box must already lie inside the frame (see [`Self::clamp_to`]).
    pub fn to_pixel_rect(&self) -> Option<PixelRect> {
        let x1 = self.x1.max(0.0) as u32;
        let y1 = self.y1.max(0.0) as u32;
        let x2 = self.x2.max(0.0) as u32;
        let y2 = self.y2.max(0.0) as u32;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(PixelRect {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }

    /// Clamp to the frame and convert to pixels in one step.
    pub fn crop_window(&self, frame_width: u32, frame_height: u32) -> Option<PixelRect> {
        self.clamp_to(frame_width, frame_height).to_pixel_rect()
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn bbox(x1: f64, y1: f64, x2: f64, y2: f64) -> BoundingBox {
        BoundingBox::new(x1, y1, x2, y2)
    }

    // ── IoU ──────────────────────────────────────────────────────────

    #[test]
    fn test_iou_identical() {
        let a = bbox(10.0, 10.0, 110.0, 110.0);
        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        // intersection 50*100 = 5000, union 15000
        let a = bbox(0.0, 0.0, 100.0, 100.0);
        let b = bbox(50.0, 0.0, 150.0, 100.0);
        assert_relative_eq!(a.iou(&b), 5000.0 / 15000.0);
    }

    #[test]
    fn test_iou_touching_edges() {
        let a = bbox(0.0, 0.0, 50.0, 50.0);
        let b = bbox(50.0, 0.0, 100.0, 50.0);
        assert_relative_eq!(a.iou(&b), 0.0);
    }

    // ── Geometry ─────────────────────────────────────────────────────

    #[test]
    fn test_center_truncates() {
        assert_eq!(bbox(0.0, 0.0, 5.0, 9.0).center(), (2, 4));
    }

    #[test]
    fn test_clamp_inside_frame_is_identity() {
        let b = bbox(10.0, 20.0, 30.0, 40.0);
        assert_eq!(b.clamp_to(100, 100), b);
    }

    #[test]
    fn test_clamp_restricts_to_frame() {
        let b = bbox(-20.0, -5.0, 130.0, 90.0).clamp_to(100, 80);
        assert_eq!(b, bbox(0.0, 0.0, 100.0, 80.0));
    }

    #[test]
    fn test_pixel_rect_truncates() {
        let rect = bbox(10.7, 20.2, 30.9, 41.5).to_pixel_rect().unwrap();
        assert_eq!(
            rect,
            PixelRect {
                x: 10,
                y: 20,
                width: 20,
                height: 21
            }
        );
    }

    // ── Zero-area windows ────────────────────────────────────────────

    #[rstest]
    #[case::fully_left(bbox(-50.0, 10.0, -10.0, 40.0))]
    #[case::fully_below(bbox(10.0, 120.0, 40.0, 150.0))]
    #[case::sub_pixel(bbox(10.2, 10.0, 10.8, 40.0))]
    #[case::collapsed(bbox(30.0, 30.0, 30.0, 60.0))]
    fn test_crop_window_empty(#[case] b: BoundingBox) {
        assert!(b.crop_window(100, 100).is_none());
    }

    #[test]
    fn test_crop_window_partially_outside() {
        let rect = bbox(-10.0, 90.0, 20.0, 130.0).crop_window(100, 100).unwrap();
        assert_eq!(
            rect,
            PixelRect {
                x: 0,
                y: 90,
                width: 20,
                height: 10
            }
        );
    }
}
