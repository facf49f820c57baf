use envconfig::Envconfig;

use common_kafka::config::{ConsumerConfig, KafkaConfig};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(nested = true)]
    pub consumer: ConsumerConfig,

    #[envconfig(from = "SIMILARITY_TOPIC", default = "event_similarity")]
    pub similarity_topic: String,

    #[envconfig(from = "DEAD_LETTER_TOPIC", default = "user_interactions_dlq")]
    pub dead_letter_topic: String,

    // Scores moving less than this since their last emission are not
    // re-published
    #[envconfig(from = "SCORE_EMIT_EPSILON", default = "0.001")]
    pub score_emit_epsilon: f64,

    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3302")]
    pub port: u16,
}

impl Config {
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        // The aggregate state lives in memory and is rebuilt by replaying
        // the action stream from the earliest offset on every start. The
        // group therefore never commits offsets: a committed offset would
        // make a restart resume mid-stream against empty state.
        ConsumerConfig::set_defaults("similarity-worker", "user_interactions", false);
        Self::init_from_env()
    }
}
