use std::time::Duration;

use sqlx::PgPool;
use tokio::time::{timeout, Instant};
use tracing::{error, warn};

use common_kafka::kafka_consumer::{Offset, RecvErr, SingleTopicConsumer};
use common_types::{EventSimilarity, UserAction};
use health::HealthHandle;

use crate::metrics_consts::{
    BATCH_WRITE_FAILED, EMPTY_MESSAGES, INCOMPATIBLE_MESSAGES, SIMILARITY_PARSE_ERRORS,
    SIMILARITY_UPDATES_RECEIVED, WEIGHT_PARSE_ERRORS, WEIGHT_UPDATES_RECEIVED,
};
use crate::updates::{
    write_similarity_batch, write_weight_batch, SimilarityBatch, WeightBatch,
};

#[derive(Clone, Copy)]
pub struct BatchLimits {
    pub max_size: usize,
    pub max_age: Duration,
}

/// Materializes the similarity stream into Postgres. Offsets are stored
/// only once the owning batch has been handled: committed, or dropped after
/// exhausted retries (the view is eventually consistent and later traffic
/// corrects it).
pub async fn run_similarity_loop(
    consumer: SingleTopicConsumer,
    pool: PgPool,
    liveness: HealthHandle,
    limits: BatchLimits,
) {
    loop {
        let mut batch = SimilarityBatch::default();
        let mut offsets: Vec<Offset> = Vec::new();
        let started = Instant::now();

        while batch.len() < limits.max_size && started.elapsed() < limits.max_age {
            liveness.report_healthy();

            let received =
                timeout(Duration::from_secs(1), consumer.json_recv::<EventSimilarity>()).await;
            match received {
                Err(_) => continue, // timeout, re-check batch age
                Ok(Ok((update, offset))) => {
                    metrics::counter!(SIMILARITY_UPDATES_RECEIVED).increment(1);
                    if !update.is_compatible() {
                        metrics::counter!(INCOMPATIBLE_MESSAGES, &[("stream", "similarity")])
                            .increment(1);
                        warn!(
                            "discarding similarity update with unsupported version {}",
                            update.version
                        );
                        offsets.push(offset);
                        continue;
                    }
                    batch.append(update);
                    offsets.push(offset);
                }
                Ok(Err(RecvErr::Empty)) => {
                    metrics::counter!(EMPTY_MESSAGES, &[("stream", "similarity")]).increment(1);
                }
                Ok(Err(RecvErr::Serde { error, .. })) => {
                    metrics::counter!(SIMILARITY_PARSE_ERRORS).increment(1);
                    warn!("failed to parse similarity update: {:?}", error);
                }
                Ok(Err(RecvErr::Kafka(e))) => {
                    error!(error = %e, "similarity consumer recv error, will retry");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        if let Err(e) = write_similarity_batch(&pool, &batch).await {
            metrics::counter!(BATCH_WRITE_FAILED, &[("stream", "similarity")]).increment(1);
            error!("dropping similarity batch after exhausted retries: {:?}", e);
        }

        for offset in offsets {
            if let Err(e) = offset.store() {
                warn!("failed to store similarity offset: {:?}", e);
            }
        }
    }
}

/// Materializes user weights from the action stream, with the same offset
/// discipline as the similarity loop. The running-max upsert makes replayed
/// and duplicated actions no-ops.
pub async fn run_weights_loop(
    consumer: SingleTopicConsumer,
    pool: PgPool,
    liveness: HealthHandle,
    limits: BatchLimits,
) {
    loop {
        let mut batch = WeightBatch::default();
        let mut offsets: Vec<Offset> = Vec::new();
        let started = Instant::now();

        while batch.len() < limits.max_size && started.elapsed() < limits.max_age {
            liveness.report_healthy();

            let received =
                timeout(Duration::from_secs(1), consumer.json_recv::<UserAction>()).await;
            match received {
                Err(_) => continue,
                Ok(Ok((action, offset))) => {
                    metrics::counter!(WEIGHT_UPDATES_RECEIVED).increment(1);
                    if !action.is_compatible() {
                        metrics::counter!(INCOMPATIBLE_MESSAGES, &[("stream", "actions")])
                            .increment(1);
                        warn!(
                            "discarding action with unsupported version {}",
                            action.version
                        );
                        offsets.push(offset);
                        continue;
                    }
                    batch.append(&action);
                    offsets.push(offset);
                }
                Ok(Err(RecvErr::Empty)) => {
                    metrics::counter!(EMPTY_MESSAGES, &[("stream", "actions")]).increment(1);
                }
                Ok(Err(RecvErr::Serde { error, .. })) => {
                    metrics::counter!(WEIGHT_PARSE_ERRORS).increment(1);
                    warn!("failed to parse action: {:?}", error);
                }
                Ok(Err(RecvErr::Kafka(e))) => {
                    error!(error = %e, "weights consumer recv error, will retry");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        if let Err(e) = write_weight_batch(&pool, &batch).await {
            metrics::counter!(BATCH_WRITE_FAILED, &[("stream", "actions")]).increment(1);
            error!("dropping weight batch after exhausted retries: {:?}", e);
        }

        for offset in offsets {
            if let Err(e) = offset.store() {
                warn!("failed to store action offset: {:?}", e);
            }
        }
    }
}
