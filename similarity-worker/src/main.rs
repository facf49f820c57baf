use std::future::ready;
use std::time::Duration;

use axum::{routing::get, Router};
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use common_kafka::kafka_consumer::SingleTopicConsumer;
use common_kafka::kafka_producer::create_kafka_producer;
use health::HealthRegistry;
use serve_metrics::{serve, setup_metrics_routes};

use similarity_worker::config::Config;
use similarity_worker::consumer::AggregationLoop;
use similarity_worker::engine::SimilarityEngine;
use similarity_worker::store::InMemoryStateStore;

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy()
            .add_directive("rdkafka=warn".parse().unwrap()),
    );
    tracing_subscriber::registry().with(log_layer).init();
}

pub async fn index() -> &'static str {
    "similarity worker"
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    setup_tracing();
    info!("Starting similarity worker...");

    common_types::validate_wire_compat().map_err(anyhow::Error::msg)?;

    let config = Config::init_with_defaults()?;

    let liveness = HealthRegistry::new("liveness");
    let worker_liveness = liveness.register("worker", Duration::from_secs(60));
    let producer_liveness = liveness.register("rdkafka", Duration::from_secs(30));

    let consumer = SingleTopicConsumer::new(config.kafka.clone(), config.consumer.clone())?;
    let producer = create_kafka_producer(&config.kafka, producer_liveness).await?;

    info!(
        topic = config.consumer.kafka_consumer_topic,
        group_id = config.consumer.kafka_consumer_group,
        similarity_topic = config.similarity_topic,
        "Configuration loaded"
    );

    // Health and metrics server
    let bind = format!("{}:{}", config.host, config.port);
    let health_router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", {
            let liveness = liveness.clone();
            get(move || ready(liveness.get_status()))
        });
    let health_router = setup_metrics_routes(health_router);

    tokio::task::spawn(async move {
        serve(health_router, &bind)
            .await
            .expect("failed to start health server");
    });

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl+c");
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let engine = SimilarityEngine::new(InMemoryStateStore::new(), config.score_emit_epsilon);
    let aggregation_loop = AggregationLoop::new(
        consumer,
        producer,
        engine,
        config.consumer.kafka_consumer_topic.clone(),
        config.similarity_topic.clone(),
        config.dead_letter_topic.clone(),
        worker_liveness,
    );
    aggregation_loop.run(shutdown_rx).await?;

    info!("Similarity worker shut down");
    Ok(())
}
