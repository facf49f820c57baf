use std::net::SocketAddr;

use envconfig::Envconfig;

use common_kafka::config::KafkaConfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "false")]
    pub print_sink: bool,

    #[envconfig(default = "127.0.0.1:3300")]
    pub address: SocketAddr,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(from = "KAFKA_TOPIC", default = "user_interactions")]
    pub kafka_topic: String,

    // Client clocks skew; anything further ahead than this is implausible
    #[envconfig(default = "300")]
    pub max_future_timestamp_drift_secs: i64,
}
