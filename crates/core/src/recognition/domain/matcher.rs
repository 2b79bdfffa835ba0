use crate::shared::constants::{MAX_DIAGNOSTICS, UNKNOWN_LABEL};

use super::embedding::cosine_distance;
use super::identity_database::IdentityDatabase;

/// One database record's distance to the query.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedMatch {
    pub origin: String,
    pub name: String,
    pub distance: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatchResult {
    /// Nearest record's name when accepted, otherwise "Unknown".
    pub best_name: String,
    /// Smallest distance seen; `None` for an empty database.
    pub min_distance: Option<f32>,
    pub accepted: bool,
    /// Ascending by distance, at most 20 entries.
    pub ranked: Vec<RankedMatch>,
}

impl MatchResult {
    fn unknown() -> Self {
        Self {
            best_name: UNKNOWN_LABEL.to_string(),
            min_distance: None,
            accepted: false,
            ranked: Vec::new(),
        }
    }
}

/// Exhaustive nearest-neighbor search by cosine distance.
#[derive(Clone, Copy, Debug)]
pub struct NearestNeighborMatcher {
    threshold: f32,
}

impl NearestNeighborMatcher {
    /// `threshold` is the largest accepted distance, inclusive.
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Scores a unit-length `query` against every record.
    ///
    /// The query must have the database's dimension. Equal distances keep
    /// database order, so the earlier record wins a tie.
    pub fn match_query(&self, query: &[f32], database: &IdentityDatabase) -> MatchResult {
        debug_assert!(database.dimension().map_or(true, |d| d == query.len()));
        if database.is_empty() {
            return MatchResult::unknown();
        }

        let mut ranked: Vec<RankedMatch> = database
            .records()
            .iter()
            .map(|r| RankedMatch {
                origin: r.origin.clone(),
                name: r.name.clone(),
                distance: cosine_distance(query, &r.vector),
            })
            .collect();
        // Stable sort: ties stay in record order.
        ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        ranked.truncate(MAX_DIAGNOSTICS);

        let nearest = &ranked[0];
        let accepted = nearest.distance <= self.threshold;
        MatchResult {
            best_name: if accepted {
                nearest.name.clone()
            } else {
                UNKNOWN_LABEL.to_string()
            },
            min_distance: Some(nearest.distance),
            accepted,
            ranked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::domain::identity_database::EmbeddingRecord;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn record(name: &str, vector: Vec<f32>, origin: &str) -> EmbeddingRecord {
        EmbeddingRecord {
            name: name.to_string(),
            vector,
            origin: origin.to_string(),
        }
    }

    fn db(records: Vec<EmbeddingRecord>) -> IdentityDatabase {
        IdentityDatabase::new(records).unwrap()
    }

    /// Unit vector at cosine distance `d` from [1, 0].
    fn at_distance(d: f32) -> Vec<f32> {
        let cos = 1.0 - d;
        vec![cos, (1.0 - cos * cos).max(0.0).sqrt()]
    }

    #[rstest]
    #[case::identical(vec![1.0, 0.0], 0.0)]
    #[case::orthogonal(vec![0.0, 1.0], 1.0)]
    #[case::opposite(vec![-1.0, 0.0], 2.0)]
    fn test_distance_range(#[case] query: Vec<f32>, #[case] expected: f32) {
        let database = db(vec![record("alice", vec![1.0, 0.0], "a.jpg")]);
        let result = NearestNeighborMatcher::new(2.0).match_query(&query, &database);
        assert_relative_eq!(result.min_distance.unwrap(), expected, epsilon = 1e-6);
    }

    #[rstest]
    #[case::below(0.49, true)]
    #[case::at(0.5, true)]
    #[case::above(0.51, false)]
    fn test_threshold_is_inclusive(#[case] distance: f32, #[case] accepted: bool) {
        let database = db(vec![record("alice", vec![1.0, 0.0], "a.jpg")]);
        // Threshold taken from the computed distance so float error cannot flip it.
        let query = at_distance(distance);
        let exact = cosine_distance(&query, &[1.0, 0.0]);
        let threshold = if distance == 0.5 { exact } else { 0.5 };

        let result = NearestNeighborMatcher::new(threshold).match_query(&query, &database);
        assert_eq!(result.accepted, accepted);
        let expected_name = if accepted { "alice" } else { UNKNOWN_LABEL };
        assert_eq!(result.best_name, expected_name);
    }

    #[test]
    fn test_empty_database_is_unknown() {
        let result = NearestNeighborMatcher::new(0.5).match_query(&[1.0, 0.0], &IdentityDatabase::empty());
        assert_eq!(result.best_name, UNKNOWN_LABEL);
        assert_eq!(result.min_distance, None);
        assert!(!result.accepted);
        assert!(result.ranked.is_empty());
    }

    #[test]
    fn test_rejection_keeps_diagnostics() {
        let database = db(vec![record("alice", vec![1.0, 0.0], "alice_1.jpg")]);
        let result = NearestNeighborMatcher::new(0.5).match_query(&at_distance(0.7), &database);

        assert_eq!(result.best_name, UNKNOWN_LABEL);
        assert_eq!(result.ranked.len(), 1);
        assert_eq!(result.ranked[0].name, "alice");
        assert_eq!(result.ranked[0].origin, "alice_1.jpg");
        assert_relative_eq!(result.ranked[0].distance, 0.7, epsilon = 1e-5);
    }

    #[test]
    fn test_ranked_ascending_and_truncated() {
        let records = (0..25)
            .map(|i| {
                let d = 0.04 * (25 - i) as f32;
                record(&format!("p{i}"), at_distance(d), &format!("{i}.jpg"))
            })
            .collect();
        let result = NearestNeighborMatcher::new(0.5).match_query(&[1.0, 0.0], &db(records));

        assert_eq!(result.ranked.len(), MAX_DIAGNOSTICS);
        assert!(result
            .ranked
            .windows(2)
            .all(|w| w[0].distance <= w[1].distance));
        assert_eq!(result.best_name, "p24");
    }

    #[test]
    fn test_tie_goes_to_first_record() {
        let database = db(vec![
            record("alice", vec![0.0, 1.0], "a.jpg"),
            record("bob", vec![0.0, 1.0], "b.jpg"),
        ]);
        let result = NearestNeighborMatcher::new(0.5).match_query(&[0.0, 1.0], &database);
        assert_eq!(result.best_name, "alice");
    }

    #[test]
    fn test_picks_nearest_over_first() {
        let database = db(vec![
            record("bob", at_distance(0.4), "b.jpg"),
            record("alice", at_distance(0.1), "a.jpg"),
        ]);
        let result = NearestNeighborMatcher::new(0.5).match_query(&[1.0, 0.0], &database);
        assert_eq!(result.best_name, "alice");
        assert_relative_eq!(result.min_distance.unwrap(), 0.1, epsilon = 1e-5);
    }
}
