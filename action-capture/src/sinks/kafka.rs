use async_trait::async_trait;
use metrics::counter;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord};
use tracing::{error, info_span, instrument, Instrument};

use common_kafka::config::KafkaConfig;
use common_kafka::kafka_producer::{create_kafka_producer, KafkaContext};
use common_types::UserAction;
use health::HealthHandle;

use crate::api::CollectError;
use crate::collect::report_dropped_actions;
use crate::sinks::ActionSink;

/// Publishes validated actions onto the action stream, keyed by user id.
/// The producer retries transient broker failures internally, bounded by
/// `message.timeout.ms`; exhaustion surfaces as a retryable error.
#[derive(Clone)]
pub struct KafkaSink {
    producer: FutureProducer<KafkaContext>,
    topic: String,
}

impl KafkaSink {
    pub async fn new(
        config: &KafkaConfig,
        topic: String,
        liveness: HealthHandle,
    ) -> anyhow::Result<KafkaSink> {
        let producer = create_kafka_producer(config, liveness).await?;

        Ok(KafkaSink { producer, topic })
    }

    async fn kafka_send(
        producer: FutureProducer<KafkaContext>,
        topic: String,
        action: UserAction,
    ) -> Result<DeliveryFuture, CollectError> {
        let payload = serde_json::to_string(&action).map_err(|e| {
            error!("failed to serialize action: {}", e);
            CollectError::NonRetryableSinkError
        })?;

        let key = action.partition_key();

        match producer.send_result(FutureRecord {
            topic: topic.as_str(),
            payload: Some(&payload),
            partition: None,
            key: Some(&key),
            timestamp: None,
            headers: None,
        }) {
            Ok(ack) => Ok(ack),
            Err((e, _)) => match e.rdkafka_error_code() {
                Some(RDKafkaErrorCode::MessageSizeTooLarge) => {
                    report_dropped_actions("kafka_message_size", 1);
                    Err(CollectError::ActionTooBig)
                }
                _ => {
                    report_dropped_actions("kafka_write_error", 1);
                    error!("failed to produce action: {}", e);
                    Err(CollectError::RetryableSinkError)
                }
            },
        }
    }

    async fn process_ack(delivery: DeliveryFuture) -> Result<(), CollectError> {
        match delivery.await {
            Err(_) => {
                // Cancelled due to timeout while retrying
                counter!("capture_kafka_produce_errors_total").increment(1);
                error!("failed to produce to Kafka before write timeout");
                Err(CollectError::RetryableSinkError)
            }
            Ok(Err((KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge), _))) => {
                // Rejected by broker due to message size
                report_dropped_actions("kafka_message_size", 1);
                Err(CollectError::ActionTooBig)
            }
            Ok(Err((err, _))) => {
                // Unretriable produce error
                counter!("capture_kafka_produce_errors_total").increment(1);
                error!("failed to produce to Kafka: {}", err);
                Err(CollectError::RetryableSinkError)
            }
            Ok(Ok(_)) => {
                counter!("capture_actions_ingested_total").increment(1);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ActionSink for KafkaSink {
    #[instrument(skip_all)]
    async fn send(&self, action: UserAction) -> Result<(), CollectError> {
        let ack = Self::kafka_send(self.producer.clone(), self.topic.clone(), action).await?;
        Self::process_ack(ack)
            .instrument(info_span!("ack_wait"))
            .await
    }
}
