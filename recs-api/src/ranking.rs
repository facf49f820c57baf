use std::collections::{HashMap, HashSet};

use sqlx::FromRow;

/// One materialized similarity row, as fetched for ranking.
#[derive(Debug, Clone, FromRow)]
pub struct SimilarityRow {
    pub event_a: i64,
    pub event_b: i64,
    pub score: f64,
}

/// One of the user's interacted events and their weight on it.
#[derive(Debug, Clone, FromRow)]
pub struct WeightRow {
    pub event_id: i64,
    pub weight: f64,
}

/// Order rows touching `event_id` by score descending, ties broken by the
/// lower other-event id. The ordering is total, so repeated calls over the
/// same rows return the same list, which paging relies on.
pub fn rank_similar(event_id: i64, rows: &[SimilarityRow], limit: usize) -> Vec<(i64, f64)> {
    let mut ranked: Vec<(i64, f64)> = rows
        .iter()
        .filter_map(|row| {
            if row.event_a == event_id {
                Some((row.event_b, row.score))
            } else if row.event_b == event_id {
                Some((row.event_a, row.score))
            } else {
                None
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

/// Rank candidate events for a user: for each event the user has not
/// interacted with, sum the user's weight on each interacted event times
/// that event's similarity to the candidate. Same tie-break rule as
/// [`rank_similar`].
pub fn rank_recommendations(
    weights: &[WeightRow],
    similarities: &[SimilarityRow],
    limit: usize,
) -> Vec<(i64, f64)> {
    let interacted: HashSet<i64> = weights.iter().map(|w| w.event_id).collect();
    let weight_of: HashMap<i64, f64> = weights.iter().map(|w| (w.event_id, w.weight)).collect();

    let mut totals: HashMap<i64, f64> = HashMap::new();
    for row in similarities {
        for (known, candidate) in [
            (row.event_a, row.event_b),
            (row.event_b, row.event_a),
        ] {
            if interacted.contains(&candidate) {
                continue;
            }
            if let Some(weight) = weight_of.get(&known) {
                *totals.entry(candidate).or_insert(0.0) += weight * row.score;
            }
        }
    }

    let mut ranked: Vec<(i64, f64)> = totals.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim(event_a: i64, event_b: i64, score: f64) -> SimilarityRow {
        SimilarityRow {
            event_a,
            event_b,
            score,
        }
    }

    fn weight(event_id: i64, weight: f64) -> WeightRow {
        WeightRow { event_id, weight }
    }

    #[test]
    fn similar_events_are_ranked_deterministically() {
        let rows = vec![
            sim(10, 20, 0.5),
            sim(10, 30, 0.9),
            sim(5, 10, 0.5),
            sim(40, 50, 0.8), // does not touch event 10
        ];

        let ranked = rank_similar(10, &rows, 10);
        // 30 first on score, then the 0.5 tie broken by ascending id: 5 < 20
        assert_eq!(ranked, vec![(30, 0.9), (5, 0.5), (20, 0.5)]);

        // Stable across repeated calls
        assert_eq!(rank_similar(10, &rows, 10), ranked);
    }

    #[test]
    fn similar_events_respects_the_limit() {
        let rows = vec![sim(10, 20, 0.5), sim(10, 30, 0.9), sim(10, 40, 0.7)];
        let ranked = rank_similar(10, &rows, 2);
        assert_eq!(ranked, vec![(30, 0.9), (40, 0.7)]);
    }

    #[test]
    fn recommendations_weight_similarities_by_interest() {
        // User interacted with 10 (weight 1.0) and 20 (weight 0.4)
        let weights = vec![weight(10, 1.0), weight(20, 0.4)];
        let similarities = vec![
            sim(10, 30, 0.5), // candidate 30 via event 10
            sim(20, 30, 0.5), // candidate 30 via event 20 too
            sim(10, 40, 0.6), // candidate 40 via event 10 only
        ];

        let ranked = rank_recommendations(&weights, &similarities, 10);

        // 30: 1.0*0.5 + 0.4*0.5 = 0.7; 40: 1.0*0.6 = 0.6
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, 30);
        assert!((ranked[0].1 - 0.7).abs() < 1e-9);
        assert_eq!(ranked[1].0, 40);
        assert!((ranked[1].1 - 0.6).abs() < 1e-9);
    }

    #[test]
    fn recommendations_exclude_already_interacted_events() {
        let weights = vec![weight(10, 1.0), weight(20, 0.4)];
        // The only similarity is between two events the user already knows
        let similarities = vec![sim(10, 20, 0.9)];

        assert!(rank_recommendations(&weights, &similarities, 10).is_empty());
    }

    #[test]
    fn recommendation_ties_break_on_ascending_event_id() {
        let weights = vec![weight(10, 0.5)];
        let similarities = vec![sim(10, 40, 0.8), sim(10, 30, 0.8)];

        let ranked = rank_recommendations(&weights, &similarities, 10);
        assert_eq!(ranked[0].0, 30);
        assert_eq!(ranked[1].0, 40);
    }

    #[test]
    fn no_interactions_means_no_recommendations() {
        let similarities = vec![sim(10, 20, 0.9)];
        assert!(rank_recommendations(&[], &similarities, 10).is_empty());
    }
}
