use std::time::Duration;

use chrono::Utc;
use rdkafka::producer::FutureProducer;
use tracing::{error, info, warn};

use common_kafka::dead_letter::{send_to_dead_letter, DeadLetter};
use common_kafka::kafka_consumer::{Offset, RecvErr, SingleTopicConsumer};
use common_kafka::kafka_producer::{send_keyed_iter_to_kafka, KafkaContext};
use common_types::UserAction;
use health::HealthHandle;

use crate::engine::{ApplyOutcome, SimilarityEngine};
use crate::metrics_consts::{
    ACTIONS_APPLIED, ACTIONS_DEAD_LETTERED, ACTIONS_RECEIVED, ACTIONS_SKIPPED,
    ACTION_PARSE_ERRORS, EMPTY_ACTIONS, KAFKA_RECV_ERRORS, PAIRS_UPDATED, SCORES_EMITTED,
};
use crate::store::StateStore;

/// Consumes the action stream, applies each action to the aggregate state
/// and publishes changed pair scores onto the similarity stream. The stream
/// offset is stored only after the similarity produce has been acked, so a
/// crash in between redelivers the action; reprocessing is idempotent.
pub struct AggregationLoop<S> {
    consumer: SingleTopicConsumer,
    producer: FutureProducer<KafkaContext>,
    engine: SimilarityEngine<S>,
    source_topic: String,
    similarity_topic: String,
    dead_letter_topic: String,
    liveness: HealthHandle,
}

impl<S: StateStore> AggregationLoop<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        consumer: SingleTopicConsumer,
        producer: FutureProducer<KafkaContext>,
        engine: SimilarityEngine<S>,
        source_topic: String,
        similarity_topic: String,
        dead_letter_topic: String,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            consumer,
            producer,
            engine,
            source_topic,
            similarity_topic,
            dead_letter_topic,
            liveness,
        }
    }

    pub async fn run(
        &self,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), anyhow::Error> {
        info!("Starting aggregation loop");

        loop {
            if *shutdown.borrow() {
                info!("Shutdown signal received, stopping aggregation loop");
                return Ok(());
            }

            self.liveness.report_healthy();

            let received = tokio::select! {
                _ = shutdown.changed() => continue,
                received = self.consumer.json_recv::<UserAction>() => received,
            };

            match received {
                Ok((action, offset)) => self.process(action, offset).await?,
                Err(RecvErr::Empty) => {
                    warn!("Received empty action");
                    metrics::counter!(EMPTY_ACTIONS).increment(1);
                }
                Err(RecvErr::Serde { error, payload }) => {
                    // Offset already stored by the consumer; one poison
                    // message must not stall the partition
                    metrics::counter!(ACTION_PARSE_ERRORS).increment(1);
                    warn!("Failed to parse action: {:?}", error);
                    self.dead_letter(format!("parse failure: {error}"), &payload)
                        .await;
                }
                Err(RecvErr::Kafka(e)) => {
                    error!(error = %e, "kafka recv error, will retry");
                    metrics::counter!(KAFKA_RECV_ERRORS).increment(1);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn process(&self, action: UserAction, offset: Offset) -> Result<(), anyhow::Error> {
        metrics::counter!(ACTIONS_RECEIVED).increment(1);

        if !action.is_compatible() {
            metrics::counter!(ACTION_PARSE_ERRORS).increment(1);
            let payload = serde_json::to_vec(&action).unwrap_or_default();
            self.dead_letter(
                format!("unsupported schema version {}", action.version),
                &payload,
            )
            .await;
            offset.store()?;
            return Ok(());
        }

        match self.engine.apply(&action, Utc::now()) {
            ApplyOutcome::Skipped => {
                metrics::counter!(ACTIONS_SKIPPED).increment(1);
            }
            ApplyOutcome::Applied(emissions) => {
                metrics::counter!(ACTIONS_APPLIED).increment(1);
                metrics::counter!(PAIRS_UPDATED).increment(emissions.len() as u64);

                if !emissions.is_empty() {
                    let count = emissions.len();
                    let results = send_keyed_iter_to_kafka(
                        &self.producer,
                        &self.similarity_topic,
                        |s| Some(s.partition_key()),
                        emissions,
                    )
                    .await;

                    for result in results {
                        // The producer already retried internally, bounded by
                        // its message timeout. If the similarity stream is
                        // unreachable we stop; a restart replays the action
                        // stream and re-derives every score.
                        result.map_err(|e| {
                            error!("failed to publish similarity update: {}", e);
                            anyhow::anyhow!("similarity stream publish failed: {e}")
                        })?;
                    }
                    metrics::counter!(SCORES_EMITTED).increment(count as u64);
                }
            }
        }

        // Only now is the action's processing durable
        offset.store()?;
        Ok(())
    }

    async fn dead_letter(&self, reason: String, payload: &[u8]) {
        metrics::counter!(ACTIONS_DEAD_LETTERED).increment(1);
        let letter = DeadLetter::new(&self.source_topic, reason, payload);
        if let Err(e) = send_to_dead_letter(&self.producer, &self.dead_letter_topic, letter).await {
            // Never silently swallowed: the failure is visible in logs and
            // metrics even if the letter itself is lost
            error!("failed to dead-letter message: {}", e);
        }
    }
}
