use envconfig::Envconfig;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use action_capture::config::Config;
use action_capture::server::serve;

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
    signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl+c");
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    setup_tracing();

    common_types::validate_wire_compat().map_err(anyhow::Error::msg)?;

    let config = Config::init_from_env()?;
    let listener = TcpListener::bind(config.address).await?;

    serve(config, listener, shutdown()).await;

    Ok(())
}
