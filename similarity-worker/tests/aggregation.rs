use chrono::Utc;

use common_types::{ActionType, EventPair, UserAction, ACTION_SCHEMA_VERSION};
use similarity_worker::engine::{ApplyOutcome, SimilarityEngine};
use similarity_worker::store::{InMemoryStateStore, StateStore};

fn action(user_id: i64, event_id: i64, kind: ActionType) -> UserAction {
    UserAction {
        version: ACTION_SCHEMA_VERSION,
        user_id,
        event_id,
        action: kind,
        timestamp: Utc::now(),
    }
}

fn engine() -> SimilarityEngine<InMemoryStateStore> {
    SimilarityEngine::new(InMemoryStateStore::new(), 0.001)
}

fn apply_all(engine: &SimilarityEngine<InMemoryStateStore>, actions: &[UserAction]) {
    for a in actions {
        engine.apply(a, Utc::now());
    }
}

#[test]
fn worked_example() {
    let engine = engine();
    let pair = EventPair::new(10, 20);

    // User 1 views event 10 and event 20
    engine.apply(&action(1, 10, ActionType::View), Utc::now());
    let outcome = engine.apply(&action(1, 20, ActionType::View), Utc::now());

    assert_eq!(engine.store().event_weight_sum(10), 0.4);
    assert_eq!(engine.store().event_weight_sum(20), 0.4);
    assert_eq!(engine.store().pair_min_sum(pair), 0.4);

    // 0.4 / sqrt(0.4 * 0.4) = 1.0
    let ApplyOutcome::Applied(emissions) = outcome else {
        panic!("expected an applied outcome");
    };
    assert_eq!(emissions.len(), 1);
    assert!((emissions[0].score - 1.0).abs() < 1e-9);
    assert!((engine.current_score(pair) - 1.0).abs() < 1e-9);

    // User 2 registers event 10 only: no shared event with user 1 yet, so
    // nothing is emitted, but the pair's score is diluted by the extra
    // weight mass on event 10
    let outcome = engine.apply(&action(2, 10, ActionType::Register), Utc::now());
    assert_eq!(outcome, ApplyOutcome::Applied(vec![]));

    assert!((engine.store().event_weight_sum(10) - 1.2).abs() < 1e-9);
    assert_eq!(engine.store().pair_min_sum(pair), 0.4);

    // 0.4 / sqrt(1.2 * 0.4) ≈ 0.577
    let expected = 0.4 / (1.2_f64 * 0.4).sqrt();
    assert!((engine.current_score(pair) - expected).abs() < 1e-9);
    assert!((expected - 0.577).abs() < 0.001);
}

#[test]
fn final_state_is_independent_of_delivery_order() {
    let actions = vec![
        action(1, 10, ActionType::View),
        action(1, 20, ActionType::Register),
        action(1, 10, ActionType::Like),
        action(2, 10, ActionType::Register),
        action(2, 30, ActionType::View),
        action(3, 20, ActionType::Like),
        action(3, 30, ActionType::Like),
        action(3, 10, ActionType::View),
    ];

    // Several orderings of the same multiset, including redeliveries
    let mut reversed = actions.clone();
    reversed.reverse();

    let mut with_duplicates = actions.clone();
    with_duplicates.extend(actions.iter().rev().cloned());
    with_duplicates.extend(actions.iter().cloned());

    let reference = engine();
    apply_all(&reference, &actions);

    for variant in [reversed, with_duplicates] {
        let other = engine();
        apply_all(&other, &variant);

        for event in [10, 20, 30] {
            assert!(
                (reference.store().event_weight_sum(event)
                    - other.store().event_weight_sum(event))
                .abs()
                    < 1e-9,
                "weight sum for event {event} diverged"
            );
        }
        for (a, b) in [(10, 20), (10, 30), (20, 30)] {
            let pair = EventPair::new(a, b);
            assert!(
                (reference.store().pair_min_sum(pair) - other.store().pair_min_sum(pair)).abs()
                    < 1e-9,
                "min-sum for pair {a}:{b} diverged"
            );
            assert!(
                (reference.current_score(pair) - other.current_score(pair)).abs() < 1e-9,
                "score for pair {a}:{b} diverged"
            );
        }
    }
}

#[test]
fn replaying_applied_actions_changes_nothing_and_emits_nothing() {
    let actions = vec![
        action(1, 10, ActionType::View),
        action(1, 20, ActionType::Like),
        action(2, 10, ActionType::Register),
        action(2, 20, ActionType::View),
    ];

    let engine = engine();
    apply_all(&engine, &actions);

    let pair = EventPair::new(10, 20);
    let sum_10 = engine.store().event_weight_sum(10);
    let sum_20 = engine.store().event_weight_sum(20);
    let min_sum = engine.store().pair_min_sum(pair);

    for a in &actions {
        assert_eq!(
            engine.apply(a, Utc::now()),
            ApplyOutcome::Skipped,
            "replayed action should be a no-op"
        );
    }

    assert_eq!(engine.store().event_weight_sum(10), sum_10);
    assert_eq!(engine.store().event_weight_sum(20), sum_20);
    assert_eq!(engine.store().pair_min_sum(pair), min_sum);
}

#[test]
fn every_emission_satisfies_the_invariants() {
    let engine = engine();
    let mut emitted = 0;

    for user in 1..=6 {
        for event in [10, 20, 30, 40] {
            let kind = match (user + event) % 3 {
                0 => ActionType::View,
                1 => ActionType::Register,
                _ => ActionType::Like,
            };
            if let ApplyOutcome::Applied(emissions) =
                engine.apply(&action(user, event, kind), Utc::now())
            {
                for emission in emissions {
                    emitted += 1;
                    assert!(emission.event_a < emission.event_b);
                    assert!((0.0..=1.0).contains(&emission.score));
                    assert!(emission.is_compatible());
                }
            }
        }
    }

    assert!(emitted > 0, "expected the matrix to emit at least one score");
}
