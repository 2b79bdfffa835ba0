use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::detection::domain::detection::TrackId;
use crate::shared::bbox::BoundingBox;

use super::track_state::TrackState;

/// Owns exactly one [`TrackState`] per live track id.
pub struct TrackRegistry {
    tracks: HashMap<TrackId, TrackState>,
    ttl: Duration,
    next_generation: u64,
}

impl TrackRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tracks: HashMap::new(),
            ttl,
            next_generation: 1,
        }
    }

    /// Existing state for `track_id`, or a fresh Scanning state seeded with `bbox`.
    pub fn get_or_create(
        &mut self,
        track_id: TrackId,
        bbox: BoundingBox,
        now: Instant,
    ) -> &mut TrackState {
        let next_generation = &mut self.next_generation;
        self.tracks.entry(track_id).or_insert_with(|| {
            let generation = *next_generation;
            *next_generation += 1;
            log::debug!("New track {track_id}");
            TrackState::new(track_id, bbox, generation, now)
        })
    }

    pub fn get(&self, track_id: TrackId) -> Option<&TrackState> {
        self.tracks.get(&track_id)
    }

    pub fn get_mut(&mut self, track_id: TrackId) -> Option<&mut TrackState> {
        self.tracks.get_mut(&track_id)
    }

    /// Drops tracks unseen for longer than the TTL and returns their ids.
    pub fn remove_stale(&mut self, now: Instant) -> Vec<TrackId> {
        let ttl = self.ttl;
        let stale: Vec<TrackId> = self
            .tracks
            .values()
            .filter(|t| t.is_stale(now, ttl))
            .map(|t| t.track_id)
            .collect();
        for id in &stale {
            self.tracks.remove(id);
            log::debug!("Evicted track {id}");
        }
        stale
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackState> {
        self.tracks.values()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}
