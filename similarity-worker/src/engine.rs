use chrono::{DateTime, Utc};

use common_types::{EventPair, EventSimilarity, UserAction};

use crate::store::StateStore;

/// Outcome of applying one action to the aggregate state.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// Duplicate or weaker delivery: no state change, nothing to emit.
    Skipped,
    /// Weight raised. Carries the similarity updates whose score moved by
    /// more than the emission epsilon, sorted by pair.
    Applied(Vec<EventSimilarity>),
}

/// The incremental min-sum similarity algorithm.
///
/// For each applied action the per-user weight is raised to the running
/// maximum, the weight delta propagates into the event's total weight mass,
/// and every pair this user co-acted on gets its shared-interest mass
/// adjusted by the change in per-user minimum. Because the weight is a
/// maximum rather than a sum, applying the same multiset of actions in any
/// order, any number of times, converges to the same state.
pub struct SimilarityEngine<S> {
    store: S,
    /// Scores moving by less than this since their last emission are not
    /// re-published, bounding downstream write volume.
    score_emit_epsilon: f64,
}

impl<S: StateStore> SimilarityEngine<S> {
    pub fn new(store: S, score_emit_epsilon: f64) -> Self {
        Self {
            store,
            score_emit_epsilon,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply one action, returning the similarity updates to publish.
    /// `now` becomes the timestamp of the emitted updates, so downstream
    /// newer-wins upserts order supersessions by engine processing time.
    pub fn apply(&self, action: &UserAction, now: DateTime<Utc>) -> ApplyOutcome {
        let weight = action.action.weight();

        let Some(update) =
            self.store
                .raise_user_weight(action.user_id, action.event_id, weight)
        else {
            return ApplyOutcome::Skipped;
        };

        let delta = update.w_new - update.w_old;
        let sum_e = self.store.add_event_weight(action.event_id, delta);

        let mut emissions = Vec::new();
        for (other_id, other_weight) in update.others {
            let old_min = update.w_old.min(other_weight);
            let new_min = update.w_new.min(other_weight);

            let pair = EventPair::new(action.event_id, other_id);
            let min_sum = self.store.add_pair_min_sum(pair, new_min - old_min);

            let sum_other = self.store.event_weight_sum(other_id);
            let score = score(min_sum, sum_e, sum_other);

            let moved = match self.store.last_published_score(pair) {
                Some(last) => (score - last).abs() > self.score_emit_epsilon,
                None => true,
            };
            if moved {
                self.store.record_published_score(pair, score);
                emissions.push(EventSimilarity::new(pair, score, now));
            }
        }

        emissions.sort_by_key(|s| s.pair());
        ApplyOutcome::Applied(emissions)
    }

    /// The score the current aggregate state yields for a pair. Pairs no
    /// user has co-acted on score zero.
    pub fn current_score(&self, pair: EventPair) -> f64 {
        score(
            self.store.pair_min_sum(pair),
            self.store.event_weight_sum(pair.first()),
            self.store.event_weight_sum(pair.second()),
        )
    }
}

/// `EventPairMinSum / sqrt(EventWeightSum(A) × EventWeightSum(B))`, bounded
/// to [0, 1]. The bound holds mathematically since weights are in [0, 1];
/// the clamp only absorbs floating point drift.
fn score(min_sum: f64, sum_a: f64, sum_b: f64) -> f64 {
    let denominator = (sum_a * sum_b).sqrt();
    if denominator <= 0.0 {
        return 0.0;
    }
    (min_sum / denominator).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common_types::{ActionType, UserAction, ACTION_SCHEMA_VERSION};

    use crate::store::InMemoryStateStore;

    use super::*;

    fn action(user_id: i64, event_id: i64, action: ActionType) -> UserAction {
        UserAction {
            version: ACTION_SCHEMA_VERSION,
            user_id,
            event_id,
            action,
            timestamp: Utc::now(),
        }
    }

    fn engine() -> SimilarityEngine<InMemoryStateStore> {
        SimilarityEngine::new(InMemoryStateStore::new(), 0.001)
    }

    #[test]
    fn first_action_on_an_event_emits_nothing() {
        let engine = engine();
        let outcome = engine.apply(&action(1, 10, ActionType::View), Utc::now());
        assert_eq!(outcome, ApplyOutcome::Applied(vec![]));
    }

    #[test]
    fn duplicate_delivery_is_skipped() {
        let engine = engine();
        let a = action(1, 10, ActionType::View);

        assert!(matches!(
            engine.apply(&a, Utc::now()),
            ApplyOutcome::Applied(_)
        ));
        assert_eq!(engine.apply(&a, Utc::now()), ApplyOutcome::Skipped);
        assert_eq!(engine.apply(&a, Utc::now()), ApplyOutcome::Skipped);
        assert_eq!(engine.store().event_weight_sum(10), 0.4);
    }

    #[test]
    fn weight_is_a_max_not_a_sum() {
        let engine = engine();
        engine.apply(&action(1, 10, ActionType::View), Utc::now());
        engine.apply(&action(1, 10, ActionType::Register), Utc::now());

        // 0.8, not 0.4 + 0.8
        assert_eq!(engine.store().event_weight_sum(10), 0.8);

        // A weaker action after a stronger one changes nothing
        assert_eq!(
            engine.apply(&action(1, 10, ActionType::View), Utc::now()),
            ApplyOutcome::Skipped
        );
        assert_eq!(engine.store().event_weight_sum(10), 0.8);
    }

    #[test]
    fn co_action_produces_an_ordered_pair_update() {
        let engine = engine();
        engine.apply(&action(1, 20, ActionType::View), Utc::now());
        let outcome = engine.apply(&action(1, 10, ActionType::View), Utc::now());

        let ApplyOutcome::Applied(emissions) = outcome else {
            panic!("expected an applied outcome");
        };
        assert_eq!(emissions.len(), 1);
        assert_eq!(emissions[0].event_a, 10);
        assert_eq!(emissions[0].event_b, 20);
        assert!(emissions[0].event_a < emissions[0].event_b);
        assert!((emissions[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn scores_stay_in_bounds() {
        let engine = engine();
        let users = [1, 2, 3, 4];
        let events = [10, 20, 30];
        let kinds = [ActionType::View, ActionType::Register, ActionType::Like];

        for (i, &u) in users.iter().enumerate() {
            for (j, &e) in events.iter().enumerate() {
                let outcome = engine.apply(&action(u, e, kinds[(i + j) % 3]), Utc::now());
                if let ApplyOutcome::Applied(emissions) = outcome {
                    for emission in emissions {
                        assert!(
                            (0.0..=1.0).contains(&emission.score),
                            "score {} out of bounds",
                            emission.score
                        );
                        assert!(emission.event_a < emission.event_b);
                    }
                }
            }
        }
    }

    #[test]
    fn tiny_score_changes_are_suppressed() {
        let engine = SimilarityEngine::new(InMemoryStateStore::new(), 0.5);
        engine.apply(&action(1, 10, ActionType::View), Utc::now());
        engine.apply(&action(1, 20, ActionType::View), Utc::now());

        // Score for (10,20) is now 1.0 and published. Raising user 1's
        // weight on 10 moves the score, but by less than the epsilon.
        let outcome = engine.apply(&action(1, 10, ActionType::Register), Utc::now());
        assert_eq!(outcome, ApplyOutcome::Applied(vec![]));

        // The state still reflects the unpublished movement
        let current = engine.current_score(EventPair::new(10, 20));
        assert!(current < 1.0);
    }
}
