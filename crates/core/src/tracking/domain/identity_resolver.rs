use std::time::{Duration, Instant};

use crate::detection::domain::detection::{Detection, TrackId};
use crate::recognition::domain::recognizer::{
    AttemptDispatcher, AttemptOutcome, AttemptReport, AttemptRequest,
};
use crate::shared::bbox::BoundingBox;
use crate::shared::frame::Frame;

use super::box_stabilizer::BoxSmoother;
use super::track_registry::TrackRegistry;
use super::track_state::{IdentityStatus, TrackState};

/// Per-frame snapshot of one visible track, ready for display.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackView {
    pub track_id: TrackId,
    pub label: String,
    pub bbox: BoundingBox,
    pub status: IdentityStatus,
}

impl TrackView {
    fn of(track: &TrackState) -> Self {
        Self {
            track_id: track.track_id,
            label: track.status.label().to_string(),
            bbox: track.smoothed_bbox,
            status: track.status.clone(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolverOutput {
    /// Tracks detected in this frame, in detection order.
    pub tracks: Vec<TrackView>,
    /// Attempt results applied during this call.
    pub diagnostics: Vec<AttemptReport>,
}

/// Drives each track through Scanning → (UnknownCooldown ⇄ attempt) → Identified.
///
/// Recognition work goes through an [`AttemptDispatcher`]; with an inline
/// dispatcher results apply within the same `observe` call, with a pool
/// they apply on a later one. Either way a track has at most one attempt
/// outstanding and an identified track is never touched again.
pub struct IdentityResolver {
    registry: TrackRegistry,
    smoother: Box<dyn BoxSmoother>,
    dispatcher: Box<dyn AttemptDispatcher>,
    retry_interval: Duration,
}

impl IdentityResolver {
    pub fn new(
        smoother: Box<dyn BoxSmoother>,
        dispatcher: Box<dyn AttemptDispatcher>,
        retry_interval: Duration,
        track_ttl: Duration,
    ) -> Self {
        Self {
            registry: TrackRegistry::new(track_ttl),
            smoother,
            dispatcher,
            retry_interval,
        }
    }

    pub fn observe(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        now: Instant,
    ) -> ResolverOutput {
        for det in detections {
            let smoothed = self.smoother.smooth(det.track_id, det.bbox);
            let track = self.registry.get_or_create(det.track_id, smoothed, now);
            track.smoothed_bbox = smoothed;
            track.last_seen = now;

            if !track.is_due(now, self.retry_interval) {
                continue;
            }
            let Some(crop) = smoothed
                .crop_window(frame.width(), frame.height())
                .and_then(|rect| frame.crop(&rect))
            else {
                log::debug!(
                    "Track {} box has no area inside the frame, attempt skipped",
                    det.track_id
                );
                continue;
            };

            let request = AttemptRequest {
                track_id: det.track_id,
                generation: track.generation,
                crop,
            };
            if self.dispatcher.dispatch(request) {
                track.last_attempt = Some(now);
                track.attempt_in_flight = true;
            }
        }

        let diagnostics = self.apply_completed();

        for id in self.registry.remove_stale(now) {
            self.smoother.forget(id);
        }

        let tracks = detections
            .iter()
            .filter_map(|d| self.registry.get(d.track_id))
            .map(TrackView::of)
            .collect();

        ResolverOutput {
            tracks,
            diagnostics,
        }
    }

    /// Forgets every track and smoothing state.
    pub fn reset(&mut self) {
        self.registry.clear();
        self.smoother.clear();
        log::info!("Track state reset");
    }

    pub fn track(&self, track_id: TrackId) -> Option<&TrackState> {
        self.registry.get(track_id)
    }

    pub fn track_count(&self) -> usize {
        self.registry.len()
    }

    fn apply_completed(&mut self) -> Vec<AttemptReport> {
        let mut applied = Vec::new();
        for report in self.dispatcher.drain_completed() {
            let Some(track) = self
                .registry
                .get_mut(report.track_id)
                .filter(|t| t.generation == report.generation)
            else {
                log::debug!(
                    "Discarding result for track {} that is no longer live",
                    report.track_id
                );
                continue;
            };
            track.attempt_in_flight = false;
            if track.status.is_identified() {
                continue;
            }

            track.status = match &report.outcome {
                AttemptOutcome::Matched(result) => {
                    log::info!(
                        "Target ID {} identified as: {}",
                        track.track_id,
                        result.best_name
                    );
                    IdentityStatus::Identified(result.best_name.clone())
                }
                AttemptOutcome::NoMatch(result) => {
                    log::info!(
                        "Target ID {} not recognized (closest {}), retrying in {:.1}s",
                        track.track_id,
                        result
                            .min_distance
                            .map_or("n/a".to_string(), |d| format!("{d:.4}")),
                        self.retry_interval.as_secs_f64()
                    );
                    IdentityStatus::UnknownCooldown
                }
                AttemptOutcome::NoFaceFound => {
                    log::debug!("Target ID {}: no face found in crop", track.track_id);
                    IdentityStatus::UnknownCooldown
                }
                AttemptOutcome::Failed(reason) => {
                    log::warn!(
                        "Recognition failed for target ID {}: {reason}",
                        track.track_id
                    );
                    IdentityStatus::UnknownCooldown
                }
            };
            applied.push(report);
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use approx::assert_relative_eq;

    use crate::recognition::domain::embedding_extractor::Extraction;
    use crate::recognition::domain::identity_database::{EmbeddingRecord, IdentityDatabase};
    use crate::recognition::domain::matcher::{MatchResult, NearestNeighborMatcher};
    use crate::recognition::domain::recognizer::{InlineDispatcher, Recognizer};
    use crate::recognition::infrastructure::recognition_pool::RecognitionPool;
    use crate::recognition::infrastructure::scripted_extractor::ScriptedExtractor;
    use crate::shared::constants::UNKNOWN_LABEL;
    use crate::tracking::domain::box_stabilizer::BoxStabilizer;

    const RETRY: Duration = Duration::from_secs(10);
    const TTL: Duration = Duration::from_secs(2);

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    /// Unit vector at cosine distance `d` from alice's [1, 0].
    fn at_distance(d: f32) -> Vec<f32> {
        let cos = 1.0 - d;
        vec![cos, (1.0 - cos * cos).max(0.0).sqrt()]
    }

    fn alice_db() -> Arc<IdentityDatabase> {
        Arc::new(
            IdentityDatabase::new(vec![EmbeddingRecord {
                name: "Alice".into(),
                vector: vec![1.0, 0.0],
                origin: "alice_01.jpg".into(),
            }])
            .unwrap(),
        )
    }

    fn resolver(extractor: Arc<ScriptedExtractor>) -> IdentityResolver {
        let recognizer = Recognizer::new(extractor, alice_db(), NearestNeighborMatcher::new(0.5));
        IdentityResolver::new(
            Box::new(BoxStabilizer::default()),
            Box::new(InlineDispatcher::new(recognizer)),
            RETRY,
            TTL,
        )
    }

    fn frame() -> Frame {
        Frame::blank(640, 480, 0)
    }

    fn det(track_id: TrackId) -> Detection {
        Detection::new(track_id, BoundingBox::new(100.0, 100.0, 200.0, 220.0))
    }

    #[test]
    fn test_identity_is_sticky() {
        let extractor = Arc::new(ScriptedExtractor::always(Extraction::Embedding(vec![0.0, 1.0])));
        extractor.push(Extraction::Embedding(at_distance(0.1)));
        let mut resolver = resolver(extractor.clone());
        let t0 = Instant::now();

        let out = resolver.observe(&frame(), &[det(1)], t0);
        assert_eq!(out.tracks[0].label, "Alice");

        for i in 1..20 {
            let out = resolver.observe(&frame(), &[det(1)], t0 + secs(i as f64 * 5.0));
            assert_eq!(out.tracks[0].label, "Alice");
            assert_eq!(out.tracks[0].status, IdentityStatus::Identified("Alice".into()));
        }
        assert_eq!(extractor.calls(), 1);
    }

    #[test]
    fn test_no_second_attempt_within_interval() {
        let extractor = Arc::new(ScriptedExtractor::always(Extraction::Embedding(vec![0.0, 1.0])));
        let mut resolver = resolver(extractor.clone());
        let t0 = Instant::now();

        resolver.observe(&frame(), &[det(1)], t0);
        let out = resolver.observe(&frame(), &[det(1)], t0 + secs(5.0));

        assert_eq!(extractor.calls(), 1);
        assert_eq!(out.tracks[0].label, UNKNOWN_LABEL);
        assert_eq!(out.tracks[0].status, IdentityStatus::UnknownCooldown);
    }

    #[test]
    fn test_second_attempt_after_interval() {
        let extractor = Arc::new(ScriptedExtractor::always(Extraction::Embedding(vec![0.0, 1.0])));
        let mut resolver = resolver(extractor.clone());
        let t0 = Instant::now();

        resolver.observe(&frame(), &[det(1)], t0);
        // Keep the track alive across the interval.
        for s in 1..=10 {
            resolver.observe(&frame(), &[det(1)], t0 + secs(s as f64));
        }
        assert_eq!(extractor.calls(), 1);

        resolver.observe(&frame(), &[det(1)], t0 + secs(11.0));
        assert_eq!(extractor.calls(), 2);
    }

    #[test]
    fn test_zero_area_crop_does_not_consume_cooldown() {
        let extractor = Arc::new(ScriptedExtractor::always(Extraction::Embedding(vec![0.0, 1.0])));
        let mut resolver = resolver(extractor.clone());
        let t0 = Instant::now();

        let outside = Detection::new(1, BoundingBox::new(700.0, 500.0, 800.0, 600.0));
        let out = resolver.observe(&frame(), &[outside], t0);
        assert_eq!(extractor.calls(), 0);
        assert_eq!(out.tracks[0].status, IdentityStatus::Scanning);
        assert!(resolver.track(1).unwrap().last_attempt.is_none());
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_zero_area_track_attempts_once_it_enters_frame() {
        let extractor = Arc::new(ScriptedExtractor::always(Extraction::Embedding(vec![0.0, 1.0])));
        let recognizer = Recognizer::new(extractor.clone(), alice_db(), NearestNeighborMatcher::new(0.5));
        let mut resolver = IdentityResolver::new(
            Box::new(BoxStabilizer::new(1.0)),
            Box::new(InlineDispatcher::new(recognizer)),
            RETRY,
            TTL,
        );
        let t0 = Instant::now();

        let outside = Detection::new(1, BoundingBox::new(-100.0, 10.0, -10.0, 60.0));
        resolver.observe(&frame(), &[outside], t0);
        assert_eq!(extractor.calls(), 0);

        // Re-entering the frame right away is not blocked by a cooldown.
        let inside = Detection::new(1, BoundingBox::new(10.0, 10.0, 60.0, 60.0));
        resolver.observe(&frame(), &[inside], t0 + secs(0.1));
        assert_eq!(extractor.calls(), 1);
    }

    #[test]
    fn test_no_face_found_consumes_cooldown() {
        let extractor = Arc::new(ScriptedExtractor::always(Extraction::NoFaceFound));
        let mut resolver = resolver(extractor.clone());
        let t0 = Instant::now();

        let out = resolver.observe(&frame(), &[det(1)], t0);
        assert_eq!(out.tracks[0].status, IdentityStatus::UnknownCooldown);
        assert_eq!(out.diagnostics[0].outcome, AttemptOutcome::NoFaceFound);

        resolver.observe(&frame(), &[det(1)], t0 + secs(1.0));
        assert_eq!(extractor.calls(), 1);
        assert_eq!(resolver.track(1).unwrap().last_attempt, Some(t0));
    }

    #[test]
    fn test_extractor_failure_consumes_cooldown() {
        let extractor = Arc::new(ScriptedExtractor::always(Extraction::NoFaceFound));
        extractor.fail_next("inference error");
        let mut resolver = resolver(extractor.clone());
        let t0 = Instant::now();

        let out = resolver.observe(&frame(), &[det(1)], t0);
        assert_eq!(out.tracks[0].status, IdentityStatus::UnknownCooldown);
        resolver.observe(&frame(), &[det(1)], t0 + secs(1.0));
        assert_eq!(extractor.calls(), 1);
    }

    #[test]
    fn test_end_to_end_alice_scenario() {
        let extractor = Arc::new(ScriptedExtractor::always(Extraction::NoFaceFound));
        extractor.push(Extraction::Embedding(at_distance(0.3)));
        extractor.push(Extraction::Embedding(at_distance(0.7)));
        let mut resolver = resolver(extractor.clone());

        let out = resolver.observe(&frame(), &[det(1), det(2)], Instant::now());

        assert_eq!(out.tracks[0].track_id, 1);
        assert_eq!(out.tracks[0].label, "Alice");
        assert_eq!(out.tracks[1].track_id, 2);
        assert_eq!(out.tracks[1].label, UNKNOWN_LABEL);

        let rejected = out
            .diagnostics
            .iter()
            .find(|r| r.track_id == 2)
            .and_then(|r| r.outcome.match_result())
            .unwrap();
        assert_eq!(rejected.best_name, UNKNOWN_LABEL);
        assert_eq!(rejected.ranked[0].name, "Alice");
        assert_relative_eq!(rejected.ranked[0].distance, 0.7, epsilon = 1e-5);
    }

    #[test]
    fn test_stale_track_evicted_and_restarts_scanning() {
        let extractor = Arc::new(ScriptedExtractor::always(Extraction::Embedding(vec![0.0, 1.0])));
        let mut resolver = resolver(extractor.clone());
        let t0 = Instant::now();

        resolver.observe(&frame(), &[det(1)], t0);
        resolver.observe(&frame(), &[det(2)], t0 + secs(1.0));
        assert_eq!(resolver.track_count(), 2);

        resolver.observe(&frame(), &[det(2)], t0 + secs(3.0));
        assert!(resolver.track(1).is_none());
        assert_eq!(resolver.track_count(), 1);

        // Same id comes back: fresh state, eligible immediately.
        let shifted = Detection::new(1, BoundingBox::new(300.0, 100.0, 400.0, 220.0));
        let out = resolver.observe(&frame(), &[shifted.clone()], t0 + secs(3.5));
        assert_eq!(out.tracks[0].bbox, shifted.bbox);
        assert_eq!(extractor.calls(), 3);
    }

    #[test]
    fn test_no_detections_is_noop() {
        let extractor = Arc::new(ScriptedExtractor::always(Extraction::NoFaceFound));
        let mut resolver = resolver(extractor.clone());
        let out = resolver.observe(&frame(), &[], Instant::now());
        assert!(out.tracks.is_empty());
        assert_eq!(extractor.calls(), 0);
    }

    #[test]
    fn test_reset_clears_tracks() {
        let extractor = Arc::new(ScriptedExtractor::always(Extraction::Embedding(at_distance(0.1))));
        let mut resolver = resolver(extractor.clone());
        let t0 = Instant::now();
        resolver.observe(&frame(), &[det(1)], t0);
        assert!(resolver.track(1).unwrap().status.is_identified());

        resolver.reset();
        assert_eq!(resolver.track_count(), 0);
        resolver.observe(&frame(), &[det(1)], t0 + secs(0.5));
        assert_eq!(extractor.calls(), 2);
    }

    // ── Asynchronous completion ──────────────────────────────────────

    #[derive(Clone, Default)]
    struct ManualDispatcher {
        requests: Arc<Mutex<Vec<(TrackId, u64)>>>,
        completed: Arc<Mutex<Vec<AttemptReport>>>,
    }

    impl ManualDispatcher {
        fn complete(&self, track_id: TrackId, generation: u64, outcome: AttemptOutcome) {
            self.completed.lock().unwrap().push(AttemptReport {
                track_id,
                generation,
                outcome,
            });
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl AttemptDispatcher for ManualDispatcher {
        fn dispatch(&mut self, request: AttemptRequest) -> bool {
            self.requests
                .lock()
                .unwrap()
                .push((request.track_id, request.generation));
            true
        }

        fn drain_completed(&mut self) -> Vec<AttemptReport> {
            std::mem::take(&mut *self.completed.lock().unwrap())
        }
    }

    fn matched(name: &str) -> AttemptOutcome {
        AttemptOutcome::Matched(MatchResult {
            best_name: name.to_string(),
            min_distance: Some(0.1),
            accepted: true,
            ranked: Vec::new(),
        })
    }

    fn manual_resolver(dispatcher: &ManualDispatcher) -> IdentityResolver {
        IdentityResolver::new(
            Box::new(BoxStabilizer::default()),
            Box::new(dispatcher.clone()),
            RETRY,
            TTL,
        )
    }

    #[test]
    fn test_in_flight_attempt_blocks_retries() {
        let dispatcher = ManualDispatcher::default();
        let mut resolver = manual_resolver(&dispatcher);
        let t0 = Instant::now();

        resolver.observe(&frame(), &[det(1)], t0);
        let out = resolver.observe(&frame(), &[det(1)], t0 + secs(30.0));
        assert_eq!(dispatcher.request_count(), 1);
        assert_eq!(out.tracks[0].status, IdentityStatus::Scanning);

        let generation = resolver.track(1).unwrap().generation;
        dispatcher.complete(1, generation, matched("Alice"));
        let out = resolver.observe(&frame(), &[det(1)], t0 + secs(30.1));
        assert_eq!(out.tracks[0].label, "Alice");
    }

    #[test]
    fn test_result_for_previous_track_lifetime_is_discarded() {
        let dispatcher = ManualDispatcher::default();
        let mut resolver = manual_resolver(&dispatcher);
        let t0 = Instant::now();

        resolver.observe(&frame(), &[det(1)], t0);
        let old_generation = resolver.track(1).unwrap().generation;
        resolver.observe(&frame(), &[], t0 + secs(5.0));
        assert!(resolver.track(1).is_none());

        resolver.observe(&frame(), &[det(1)], t0 + secs(6.0));
        dispatcher.complete(1, old_generation, matched("Alice"));
        let out = resolver.observe(&frame(), &[det(1)], t0 + secs(6.1));

        assert_eq!(out.tracks[0].status, IdentityStatus::Scanning);
        assert!(out.diagnostics.is_empty());
        assert!(resolver.track(1).unwrap().attempt_in_flight);
    }

    #[test]
    fn test_identified_track_ignores_late_results() {
        let dispatcher = ManualDispatcher::default();
        let mut resolver = manual_resolver(&dispatcher);
        let t0 = Instant::now();

        resolver.observe(&frame(), &[det(1)], t0);
        let generation = resolver.track(1).unwrap().generation;
        dispatcher.complete(1, generation, matched("Alice"));
        dispatcher.complete(1, generation, matched("Bob"));
        let out = resolver.observe(&frame(), &[det(1)], t0 + secs(0.1));

        assert_eq!(out.tracks[0].label, "Alice");
        assert_eq!(out.diagnostics.len(), 1);
    }

    #[test]
    fn test_pool_dispatch_identifies_on_later_frame() {
        let extractor = Arc::new(ScriptedExtractor::always(Extraction::Embedding(at_distance(0.2))));
        let recognizer = Recognizer::new(extractor.clone(), alice_db(), NearestNeighborMatcher::new(0.5));
        let mut resolver = IdentityResolver::new(
            Box::new(BoxStabilizer::default()),
            Box::new(RecognitionPool::new(recognizer, 2)),
            RETRY,
            TTL,
        );
        let t0 = Instant::now();

        let mut label = String::new();
        for i in 0..500 {
            let out = resolver.observe(&frame(), &[det(1)], t0 + Duration::from_millis(i));
            label = out.tracks[0].label.clone();
            if label == "Alice" {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(label, "Alice");
        assert_eq!(extractor.calls(), 1);
    }
}
