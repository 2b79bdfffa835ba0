use std::sync::Arc;

use crate::detection::domain::detection::TrackId;
use crate::shared::frame::Frame;

use super::embedding::l2_normalize;
use super::embedding_extractor::{EmbeddingExtractor, Extraction};
use super::identity_database::IdentityDatabase;
use super::matcher::{MatchResult, NearestNeighborMatcher};

/// What one performed recognition attempt produced.
#[derive(Clone, Debug, PartialEq)]
pub enum AttemptOutcome {
    Matched(MatchResult),
    NoMatch(MatchResult),
    NoFaceFound,
    /// Inference or dimension error; counts as a performed non-match.
    Failed(String),
}

impl AttemptOutcome {
    pub fn identified_name(&self) -> Option<&str> {
        match self {
            AttemptOutcome::Matched(result) => Some(&result.best_name),
            _ => None,
        }
    }

    pub fn match_result(&self) -> Option<&MatchResult> {
        match self {
            AttemptOutcome::Matched(result) | AttemptOutcome::NoMatch(result) => Some(result),
            _ => None,
        }
    }
}

/// Crop → embedding → nearest neighbor, for a single face.
#[derive(Clone)]
pub struct Recognizer {
    extractor: Arc<dyn EmbeddingExtractor>,
    database: Arc<IdentityDatabase>,
    matcher: NearestNeighborMatcher,
}

impl Recognizer {
    pub fn new(
        extractor: Arc<dyn EmbeddingExtractor>,
        database: Arc<IdentityDatabase>,
        matcher: NearestNeighborMatcher,
    ) -> Self {
        Self {
            extractor,
            database,
            matcher,
        }
    }

    pub fn recognize(&self, crop: &Frame) -> AttemptOutcome {
        let mut embedding = match self.extractor.extract(crop) {
            Ok(Extraction::Embedding(v)) => v,
            Ok(Extraction::NoFaceFound) => return AttemptOutcome::NoFaceFound,
            Err(e) => return AttemptOutcome::Failed(e.to_string()),
        };

        if let Some(expected) = self.database.dimension() {
            if embedding.len() != expected {
                return AttemptOutcome::Failed(format!(
                    "embedding has {} dimensions, database has {expected}",
                    embedding.len()
                ));
            }
        }

        l2_normalize(&mut embedding);
        let result = self.matcher.match_query(&embedding, &self.database);
        log_ranking(&result);
        if result.accepted {
            AttemptOutcome::Matched(result)
        } else {
            AttemptOutcome::NoMatch(result)
        }
    }
}

fn log_ranking(result: &MatchResult) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    log::debug!("Distance analysis ({} nearest):", result.ranked.len());
    for (rank, entry) in result.ranked.iter().enumerate() {
        log::debug!(
            "  {:2}. {} ({}): {:.4}",
            rank + 1,
            entry.name,
            entry.origin,
            entry.distance
        );
    }
}

/// A face crop queued for recognition.
///
/// `generation` ties the request to one lifetime of a track id, so results
/// for an evicted and re-created track can be told apart.
#[derive(Clone, Debug)]
pub struct AttemptRequest {
    pub track_id: TrackId,
    pub generation: u64,
    pub crop: Frame,
}

#[derive(Clone, Debug)]
pub struct AttemptReport {
    pub track_id: TrackId,
    pub generation: u64,
    pub outcome: AttemptOutcome,
}

/// Where the resolver sends recognition work.
pub trait AttemptDispatcher: Send {
    /// Queues an attempt. Returns `false` if it was not accepted (busy or
    /// shutting down), in which case no attempt took place.
    fn dispatch(&mut self, request: AttemptRequest) -> bool;

    /// Reports finished since the last call, in completion order.
    fn drain_completed(&mut self) -> Vec<AttemptReport>;
}

/// Runs each attempt on the calling thread; results are available to the
/// very next `drain_completed`.
pub struct InlineDispatcher {
    recognizer: Recognizer,
    completed: Vec<AttemptReport>,
}

impl InlineDispatcher {
    pub fn new(recognizer: Recognizer) -> Self {
        Self {
            recognizer,
            completed: Vec::new(),
        }
    }
}

impl AttemptDispatcher for InlineDispatcher {
    fn dispatch(&mut self, request: AttemptRequest) -> bool {
        let outcome = self.recognizer.recognize(&request.crop);
        self.completed.push(AttemptReport {
            track_id: request.track_id,
            generation: request.generation,
            outcome,
        });
        true
    }

    fn drain_completed(&mut self) -> Vec<AttemptReport> {
        std::mem::take(&mut self.completed)
    }
}
