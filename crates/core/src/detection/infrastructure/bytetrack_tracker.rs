/// Simplified ByteTrack multi-object tracker.
///
/// Two-stage association: boxes scoring at or above the detector confidence
/// floor are matched first and may open new tracks; weaker boxes only keep
/// existing tracks alive through momentary confidence drops.
use std::collections::HashSet;

use crate::detection::domain::detection::{Detection, TrackId};
use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::shared::bbox::BoundingBox;

/// A scored box straight out of the detector, before id assignment.
#[derive(Clone, Debug)]
pub struct ScoredBox {
    pub bbox: BoundingBox,
    pub score: f64,
    /// Present when the model has a keypoint head. Ignored by the tracker.
    pub landmarks: Option<FaceLandmarks>,
}

const MATCH_IOU: f64 = 0.3;

#[derive(Clone, Debug)]
struct TrackSlot {
    id: TrackId,
    bbox: BoundingBox,
    frames_lost: usize,
    matched: bool,
}

pub struct ByteTracker {
    tracks: Vec<TrackSlot>,
    next_id: TrackId,
    max_lost: usize,
    high_confidence: f64,
}

impl ByteTracker {
    pub fn new(max_lost: usize, high_confidence: f64) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            max_lost,
            high_confidence,
        }
    }

    /// Associates this frame's boxes with live tracks and returns one
    /// detection per track matched this frame.
    pub fn update(&mut self, boxes: &[ScoredBox]) -> Vec<Detection> {
        let (high, low): (Vec<_>, Vec<_>) = boxes
            .iter()
            .enumerate()
            .partition(|(_, b)| b.score >= self.high_confidence);

        for track in &mut self.tracks {
            track.matched = false;
        }
        let num_existing = self.tracks.len();

        let all: Vec<usize> = (0..self.tracks.len()).collect();
        let matched_high = self.associate(&all, &high);

        let unmatched: Vec<usize> = (0..self.tracks.len())
            .filter(|&i| !self.tracks[i].matched)
            .collect();
        self.associate(&unmatched, &low);

        for (bi, scored) in &high {
            if !matched_high.contains(bi) {
                self.tracks.push(TrackSlot {
                    id: self.next_id,
                    bbox: scored.bbox,
                    frames_lost: 0,
                    matched: true,
                });
                self.next_id = self.next_id.wrapping_add(1).max(1);
            }
        }

        for track in self.tracks.iter_mut().take(num_existing) {
            if !track.matched {
                track.frames_lost += 1;
            }
        }
        let max_lost = self.max_lost;
        self.tracks.retain(|t| t.frames_lost <= max_lost);

        // Lost tracks stay internal for re-association but are not reported.
        self.tracks
            .iter()
            .filter(|t| t.matched)
            .map(|t| Detection::new(t.id, t.bbox))
            .collect()
    }

    /// Greedy IoU association of `candidates` onto the given track slots.
    /// Returns the indices (into the input box list) that were consumed.
    fn associate(&mut self, slots: &[usize], candidates: &[(usize, &ScoredBox)]) -> HashSet<usize> {
        let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
        for &ti in slots {
            for (bi, scored) in candidates {
                let iou = self.tracks[ti].bbox.iou(&scored.bbox);
                if iou >= MATCH_IOU {
                    pairs.push((ti, *bi, iou));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut used_tracks = HashSet::new();
        let mut used_boxes = HashSet::new();
        for (ti, bi, _) in pairs {
            if used_tracks.contains(&ti) || used_boxes.contains(&bi) {
                continue;
            }
            used_tracks.insert(ti);
            used_boxes.insert(bi);

            let Some((_, scored)) = candidates.iter().find(|(i, _)| *i == bi) else {
                continue;
            };
            let track = &mut self.tracks[ti];
            track.bbox = scored.bbox;
            track.frames_lost = 0;
            track.matched = true;
        }
        used_boxes
    }
}
