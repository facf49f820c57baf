use chrono::{DateTime, Utc};
use rdkafka::producer::FutureProducer;
use rdkafka::ClientContext;
use serde::{Deserialize, Serialize};

use crate::kafka_producer::{send_keyed_iter_to_kafka, KafkaProduceError};

/// Envelope for messages that consumed but could not be processed. The raw
/// payload rides along so an operator can inspect or replay it later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub source_topic: String,
    pub reason: String,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(source_topic: &str, reason: String, payload: &[u8]) -> Self {
        Self {
            source_topic: source_topic.to_owned(),
            reason,
            payload: String::from_utf8_lossy(payload).into_owned(),
            timestamp: Utc::now(),
        }
    }
}

/// Produce a dead letter and wait for the broker ack. Failures are returned
/// to the caller, who decides whether to log-and-continue or back off.
pub async fn send_to_dead_letter<C: ClientContext>(
    producer: &FutureProducer<C>,
    topic: &str,
    letter: DeadLetter,
) -> Result<(), KafkaProduceError> {
    send_keyed_iter_to_kafka(producer, topic, |_| None, [letter])
        .await
        .pop()
        .expect("one result per produced record")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_letter_preserves_raw_payload() {
        let raw = br#"{"user_id": "not-a-number"}"#;
        let letter = DeadLetter::new("user_interactions", "invalid user_id".to_string(), raw);

        assert_eq!(letter.source_topic, "user_interactions");
        assert_eq!(letter.payload.as_bytes(), raw);

        let json = serde_json::to_value(&letter).unwrap();
        assert_eq!(json["reason"], "invalid user_id");
    }
}
