use std::collections::HashMap;

use dashmap::DashMap;

use common_types::EventPair;

/// Result of raising a user's weight on an event. The snapshot of the
/// user's other event weights is taken under the same guard as the update,
/// so pair deltas computed from it are consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightUpdate {
    pub w_old: f64,
    pub w_new: f64,
    /// (event_id, weight) for every other event this user has acted on.
    pub others: Vec<(i64, f64)>,
}

/// The engine's aggregate state. All state behind this seam is re-derivable
/// by replaying the action stream from its earliest offset, in any order:
/// per-user weights are running maxima and the shared aggregates are sums of
/// deltas against those maxima, so the final state is independent of
/// delivery order and duplication.
///
/// Implementations must apply each mutation atomically: two workers updating
/// the same aggregate key concurrently may never lose an increment.
pub trait StateStore: Send + Sync {
    /// Raise `UserEventWeight(user, event)` to `weight` if that is higher
    /// than the current value. Returns `None` when nothing changed, which
    /// makes duplicate or weaker deliveries no-ops.
    fn raise_user_weight(&self, user_id: i64, event_id: i64, weight: f64) -> Option<WeightUpdate>;

    /// `EventWeightSum(event) += delta`, returning the new sum.
    fn add_event_weight(&self, event_id: i64, delta: f64) -> f64;

    fn event_weight_sum(&self, event_id: i64) -> f64;

    /// `EventPairMinSum(pair) += delta`, returning the new sum.
    fn add_pair_min_sum(&self, pair: EventPair, delta: f64) -> f64;

    fn pair_min_sum(&self, pair: EventPair) -> f64;

    /// Score most recently emitted for this pair, for epsilon suppression.
    fn last_published_score(&self, pair: EventPair) -> Option<f64>;

    fn record_published_score(&self, pair: EventPair, score: f64);
}

/// Sharded in-memory store. Each map's entry guard is the single point of
/// mutation for its key: read-modify-write happens while the shard lock is
/// held, so concurrent deltas from different partitions cannot be lost.
#[derive(Default)]
pub struct InMemoryStateStore {
    user_weights: DashMap<i64, HashMap<i64, f64>>,
    event_weight_sums: DashMap<i64, f64>,
    pair_min_sums: DashMap<EventPair, f64>,
    published_scores: DashMap<EventPair, f64>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStateStore {
    fn raise_user_weight(&self, user_id: i64, event_id: i64, weight: f64) -> Option<WeightUpdate> {
        let mut entry = self.user_weights.entry(user_id).or_default();

        let w_old = entry.get(&event_id).copied().unwrap_or(0.0);
        if weight <= w_old {
            return None;
        }
        entry.insert(event_id, weight);

        let others = entry
            .iter()
            .filter(|(id, _)| **id != event_id)
            .map(|(id, w)| (*id, *w))
            .collect();

        Some(WeightUpdate {
            w_old,
            w_new: weight,
            others,
        })
    }

    fn add_event_weight(&self, event_id: i64, delta: f64) -> f64 {
        let mut sum = self.event_weight_sums.entry(event_id).or_insert(0.0);
        *sum += delta;
        *sum
    }

    fn event_weight_sum(&self, event_id: i64) -> f64 {
        self.event_weight_sums
            .get(&event_id)
            .map(|sum| *sum)
            .unwrap_or(0.0)
    }

    fn add_pair_min_sum(&self, pair: EventPair, delta: f64) -> f64 {
        let mut sum = self.pair_min_sums.entry(pair).or_insert(0.0);
        *sum += delta;
        *sum
    }

    fn pair_min_sum(&self, pair: EventPair) -> f64 {
        self.pair_min_sums.get(&pair).map(|sum| *sum).unwrap_or(0.0)
    }

    fn last_published_score(&self, pair: EventPair) -> Option<f64> {
        self.published_scores.get(&pair).map(|score| *score)
    }

    fn record_published_score(&self, pair: EventPair, score: f64) {
        self.published_scores.insert(pair, score);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_is_a_running_max() {
        let store = InMemoryStateStore::new();

        let update = store.raise_user_weight(1, 10, 0.4).unwrap();
        assert_eq!(update.w_old, 0.0);
        assert_eq!(update.w_new, 0.4);

        // Weaker or equal weights change nothing
        assert!(store.raise_user_weight(1, 10, 0.4).is_none());
        assert!(store.raise_user_weight(1, 10, 0.2).is_none());

        let update = store.raise_user_weight(1, 10, 0.8).unwrap();
        assert_eq!(update.w_old, 0.4);
        assert_eq!(update.w_new, 0.8);
    }

    #[test]
    fn others_snapshot_excludes_the_updated_event() {
        let store = InMemoryStateStore::new();
        store.raise_user_weight(1, 10, 0.4);
        store.raise_user_weight(1, 20, 1.0);

        let update = store.raise_user_weight(1, 30, 0.8).unwrap();
        let mut others = update.others;
        others.sort_by_key(|(id, _)| *id);
        assert_eq!(others, vec![(10, 0.4), (20, 1.0)]);
    }

    #[test]
    fn aggregate_increments_accumulate() {
        let store = InMemoryStateStore::new();
        assert_eq!(store.add_event_weight(10, 0.4), 0.4);
        assert!((store.add_event_weight(10, 0.8) - 1.2).abs() < 1e-9);
        assert_eq!(store.event_weight_sum(99), 0.0);

        let pair = EventPair::new(10, 20);
        assert_eq!(store.add_pair_min_sum(pair, 0.4), 0.4);
        assert_eq!(store.pair_min_sum(pair), 0.4);
    }
}
