use std::time::{Duration, Instant};

use crate::detection::domain::detection::TrackId;
use crate::shared::bbox::BoundingBox;
use crate::shared::constants::UNKNOWN_LABEL;

/// Recognition progress of one track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityStatus {
    /// Never attempted; eligible immediately.
    Scanning,
    /// Last attempt found no match; eligible again after the retry interval.
    UnknownCooldown,
    /// Terminal for the track's lifetime.
    Identified(String),
}

impl IdentityStatus {
    pub fn label(&self) -> &str {
        match self {
            IdentityStatus::Identified(name) => name,
            _ => UNKNOWN_LABEL,
        }
    }

    pub fn is_identified(&self) -> bool {
        matches!(self, IdentityStatus::Identified(_))
    }
}

#[derive(Clone, Debug)]
pub struct TrackState {
    pub track_id: TrackId,
    pub smoothed_bbox: BoundingBox,
    pub status: IdentityStatus,
    /// Time of the last performed recognition attempt.
    pub last_attempt: Option<Instant>,
    pub created_at: Instant,
    pub last_seen: Instant,
    /// Distinguishes successive lifetimes of a reused track id.
    pub generation: u64,
    pub attempt_in_flight: bool,
}

impl TrackState {
    pub fn new(track_id: TrackId, bbox: BoundingBox, generation: u64, now: Instant) -> Self {
        Self {
            track_id,
            smoothed_bbox: bbox,
            status: IdentityStatus::Scanning,
            last_attempt: None,
            created_at: now,
            last_seen: now,
            generation,
            attempt_in_flight: false,
        }
    }

    /// Whether a recognition attempt should start now.
    ///
    /// Never for identified tracks or while an attempt is outstanding;
    /// otherwise when no attempt was made yet or strictly more than
    /// `retry_interval` has passed since the last one.
    pub fn is_due(&self, now: Instant, retry_interval: Duration) -> bool {
        if self.status.is_identified() || self.attempt_in_flight {
            return false;
        }
        match self.last_attempt {
            None => true,
            Some(last) => now.saturating_duration_since(last) > retry_interval,
        }
    }

    pub fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > ttl
    }
}
