use std::collections::HashMap;

use crate::detection::domain::detection::TrackId;
use crate::shared::bbox::BoundingBox;

/// Domain interface for temporal smoothing of per-track boxes.
pub trait BoxSmoother: Send {
    fn smooth(&mut self, track_id: TrackId, raw: BoundingBox) -> BoundingBox;
    fn forget(&mut self, track_id: TrackId);
    fn clear(&mut self);
}

/// EMA (Exponential Moving Average) smoother with per-track state.
///
/// Formula: `box[t] = (1 - alpha) * box[t-1] + alpha * raw`
/// Default alpha: 0.2
pub struct BoxStabilizer {
    alpha: f64,
    state: HashMap<TrackId, BoundingBox>,
}

pub const DEFAULT_ALPHA: f64 = 0.2;

impl BoxStabilizer {
    /// `alpha` in (0, 1]; larger follows the detector more closely.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            state: HashMap::new(),
        }
    }

    pub fn tracked(&self) -> usize {
        self.state.len()
    }
}

impl Default for BoxStabilizer {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl BoxSmoother for BoxStabilizer {
    fn smooth(&mut self, track_id: TrackId, raw: BoundingBox) -> BoundingBox {
        let smoothed = match self.state.get(&track_id) {
            None => raw,
            Some(prev) => {
                let old = prev.to_array();
                let new = raw.to_array();
                let mut result = [0.0; 4];
                for i in 0..4 {
                    result[i] = old[i] * (1.0 - self.alpha) + new[i] * self.alpha;
                }
                BoundingBox::from_array(result)
            }
        };

        self.state.insert(track_id, smoothed);
        smoothed
    }

    fn forget(&mut self, track_id: TrackId) {
        self.state.remove(&track_id);
    }

    fn clear(&mut self) {
        self.state.clear();
    }
}
