use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;

use common_types::{EventPair, EventSimilarity, UserAction};

use crate::metrics_consts::{
    SIMILARITY_BATCH_ATTEMPT, SIMILARITY_ROWS_AFFECTED, WEIGHT_BATCH_ATTEMPT,
    WEIGHT_ROWS_AFFECTED,
};

const BATCH_MAX_RETRY_ATTEMPTS: u64 = 3;
const BATCH_RETRY_DELAY_MS: u64 = 50;

/// Pending similarity upserts, keyed by pair so that several updates to the
/// same pair within one batch collapse to the newest. Postgres rejects an
/// `ON CONFLICT DO UPDATE` touching the same row twice in one statement.
#[derive(Debug, Default)]
pub struct SimilarityBatch {
    rows: BTreeMap<EventPair, (f64, DateTime<Utc>)>,
}

impl SimilarityBatch {
    pub fn append(&mut self, update: EventSimilarity) {
        let pair = update.pair();
        match self.rows.get(&pair) {
            Some((_, stored)) if *stored >= update.timestamp => {}
            _ => {
                self.rows.insert(pair, (update.score, update.timestamp));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Upsert a batch of similarity rows. An incoming row loses against a
/// strictly newer stored one, guarding the materialized view against
/// out-of-order redelivery. Retries deadlocks and transient failures with
/// jittered backoff; the caller decides what to do when retries exhaust.
pub async fn write_similarity_batch(
    pool: &PgPool,
    batch: &SimilarityBatch,
) -> Result<(), sqlx::Error> {
    if batch.is_empty() {
        return Ok(());
    }

    let mut event_as = Vec::with_capacity(batch.len());
    let mut event_bs = Vec::with_capacity(batch.len());
    let mut scores = Vec::with_capacity(batch.len());
    let mut updated_ats = Vec::with_capacity(batch.len());
    for (pair, (score, updated_at)) in &batch.rows {
        event_as.push(pair.first());
        event_bs.push(pair.second());
        scores.push(*score);
        updated_ats.push(*updated_at);
    }

    let mut tries = 1;
    loop {
        let result = sqlx::query(
            r#"
            INSERT INTO event_similarity (event_a, event_b, score, updated_at)
                (SELECT * FROM UNNEST(
                    $1::bigint[],
                    $2::bigint[],
                    $3::float8[],
                    $4::timestamptz[]))
                ON CONFLICT (event_a, event_b)
                DO UPDATE SET score = EXCLUDED.score, updated_at = EXCLUDED.updated_at
                WHERE event_similarity.updated_at < EXCLUDED.updated_at"#,
        )
        .bind(&event_as)
        .bind(&event_bs)
        .bind(&scores)
        .bind(&updated_ats)
        .execute(pool)
        .await;

        match result {
            Err(e) => {
                if tries == BATCH_MAX_RETRY_ATTEMPTS {
                    metrics::counter!(SIMILARITY_BATCH_ATTEMPT, &[("result", "failed")])
                        .increment(1);
                    return Err(e);
                }
                metrics::counter!(SIMILARITY_BATCH_ATTEMPT, &[("result", "retry")]).increment(1);
                let jitter = rand::random::<u64>() % 50;
                let delay = tries * BATCH_RETRY_DELAY_MS + jitter;
                warn!("similarity batch write failed: {:?}, retrying in {}ms", e, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                tries += 1;
            }
            Ok(pg_result) => {
                metrics::counter!(SIMILARITY_BATCH_ATTEMPT, &[("result", "success")]).increment(1);
                metrics::counter!(SIMILARITY_ROWS_AFFECTED)
                    .increment(pg_result.rows_affected());
                return Ok(());
            }
        }
    }
}

/// Pending user-weight upserts, keyed by (user, event) and keeping the
/// maximum weight seen, mirroring the engine's running-max rule.
#[derive(Debug, Default)]
pub struct WeightBatch {
    rows: BTreeMap<(i64, i64), (f64, DateTime<Utc>)>,
}

impl WeightBatch {
    pub fn append(&mut self, action: &UserAction) {
        let key = (action.user_id, action.event_id);
        let weight = action.action.weight();
        match self.rows.get(&key) {
            Some((stored, _)) if *stored >= weight => {}
            _ => {
                self.rows.insert(key, (weight, action.timestamp));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Upsert a batch of user weights. The `weight < EXCLUDED.weight` guard
/// keeps the stored value a running maximum, so duplicates and replays are
/// no-ops regardless of delivery order.
pub async fn write_weight_batch(pool: &PgPool, batch: &WeightBatch) -> Result<(), sqlx::Error> {
    if batch.is_empty() {
        return Ok(());
    }

    let mut user_ids = Vec::with_capacity(batch.len());
    let mut event_ids = Vec::with_capacity(batch.len());
    let mut weights = Vec::with_capacity(batch.len());
    let mut updated_ats = Vec::with_capacity(batch.len());
    for ((user_id, event_id), (weight, updated_at)) in &batch.rows {
        user_ids.push(*user_id);
        event_ids.push(*event_id);
        weights.push(*weight);
        updated_ats.push(*updated_at);
    }

    let mut tries = 1;
    loop {
        let result = sqlx::query(
            r#"
            INSERT INTO user_event_weight (user_id, event_id, weight, updated_at)
                (SELECT * FROM UNNEST(
                    $1::bigint[],
                    $2::bigint[],
                    $3::float8[],
                    $4::timestamptz[]))
                ON CONFLICT (user_id, event_id)
                DO UPDATE SET weight = EXCLUDED.weight, updated_at = EXCLUDED.updated_at
                WHERE user_event_weight.weight < EXCLUDED.weight"#,
        )
        .bind(&user_ids)
        .bind(&event_ids)
        .bind(&weights)
        .bind(&updated_ats)
        .execute(pool)
        .await;

        match result {
            Err(e) => {
                if tries == BATCH_MAX_RETRY_ATTEMPTS {
                    metrics::counter!(WEIGHT_BATCH_ATTEMPT, &[("result", "failed")]).increment(1);
                    return Err(e);
                }
                metrics::counter!(WEIGHT_BATCH_ATTEMPT, &[("result", "retry")]).increment(1);
                let jitter = rand::random::<u64>() % 50;
                let delay = tries * BATCH_RETRY_DELAY_MS + jitter;
                warn!("weight batch write failed: {:?}, retrying in {}ms", e, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                tries += 1;
            }
            Ok(pg_result) => {
                metrics::counter!(WEIGHT_BATCH_ATTEMPT, &[("result", "success")]).increment(1);
                metrics::counter!(WEIGHT_ROWS_AFFECTED).increment(pg_result.rows_affected());
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use common_types::{ActionType, EventPair, EventSimilarity, ACTION_SCHEMA_VERSION};

    use super::*;

    fn ts(seconds: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, seconds).unwrap()
    }

    #[test]
    fn similarity_batch_keeps_newest_per_pair() {
        let mut batch = SimilarityBatch::default();
        batch.append(EventSimilarity::new(EventPair::new(10, 20), 0.5, ts(2)));
        batch.append(EventSimilarity::new(EventPair::new(20, 10), 0.7, ts(1)));
        batch.append(EventSimilarity::new(EventPair::new(10, 30), 0.9, ts(1)));

        assert_eq!(batch.len(), 2);
        // The older score for the same (canonicalized) pair lost
        let (score, updated_at) = batch.rows[&EventPair::new(10, 20)];
        assert_eq!(score, 0.5);
        assert_eq!(updated_at, ts(2));
    }

    #[test]
    fn weight_batch_keeps_the_maximum_per_user_event() {
        let mut batch = WeightBatch::default();
        let view = UserAction {
            version: ACTION_SCHEMA_VERSION,
            user_id: 1,
            event_id: 10,
            action: ActionType::View,
            timestamp: ts(5),
        };
        let register = UserAction {
            action: ActionType::Register,
            timestamp: ts(1),
            ..view.clone()
        };

        batch.append(&register);
        batch.append(&view); // weaker, later: ignored

        assert_eq!(batch.len(), 1);
        let (weight, _) = batch.rows[&(1, 10)];
        assert_eq!(weight, ActionType::Register.weight());
    }
}
