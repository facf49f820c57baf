use std::sync::Arc;
use std::time::Duration;

use envconfig::Envconfig;
use tokio::net::TcpListener;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use common_kafka::kafka_consumer::SingleTopicConsumer;
use serve_metrics::setup_metrics_routes;

use recs_api::api;
use recs_api::app_context::AppContext;
use recs_api::config::Config;
use recs_api::consumer::{run_similarity_loop, run_weights_loop, BatchLimits};

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy()
            .add_directive("rdkafka=warn".parse().unwrap()),
    );
    tracing_subscriber::registry().with(log_layer).init();
}

async fn shutdown() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl+c");
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    setup_tracing();
    info!("Starting recommendations api...");

    common_types::validate_wire_compat().map_err(anyhow::Error::msg)?;

    let config = Config::init_from_env()?;

    let context = Arc::new(AppContext::new(&config).await?);
    sqlx::migrate!("./migrations").run(&context.pool).await?;

    let similarity_consumer =
        SingleTopicConsumer::new(config.kafka.clone(), config.similarity_consumer())?;
    let actions_consumer =
        SingleTopicConsumer::new(config.kafka.clone(), config.actions_consumer())?;

    info!(
        similarity_topic = config.similarity_topic,
        actions_topic = config.actions_topic,
        group_id = config.kafka_group_id,
        "Configuration loaded"
    );

    let limits = BatchLimits {
        max_size: config.update_batch_size,
        max_age: Duration::from_secs(config.max_batch_age_secs),
    };

    tokio::spawn(run_similarity_loop(
        similarity_consumer,
        context.pool.clone(),
        context.similarity_liveness.clone(),
        limits,
    ));
    tokio::spawn(run_weights_loop(
        actions_consumer,
        context.pool.clone(),
        context.weights_liveness.clone(),
        limits,
    ));

    let app = setup_metrics_routes(api::router(context));

    let bind = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&bind).await?;
    info!("listening on {}", bind);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown())
        .await?;

    info!("Recommendations api shut down");
    Ok(())
}
