use std::future::Future;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tokio::net::TcpListener;

use health::HealthRegistry;

use crate::config::Config;
use crate::router;
use crate::sinks::kafka::KafkaSink;
use crate::sinks::PrintSink;
use crate::time::SystemTime;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let liveness = HealthRegistry::new("liveness");
    let max_future_drift = ChronoDuration::seconds(config.max_future_timestamp_drift_secs);

    let app = if config.print_sink {
        // Nothing asynchronous to watch; report the sink alive once so the
        // probe reflects reality for local runs
        liveness
            .register("print-sink", Duration::from_secs(60 * 60 * 24))
            .report_healthy();
        router::router(
            SystemTime {},
            PrintSink {},
            liveness,
            max_future_drift,
            config.export_prometheus,
        )
    } else {
        let producer_liveness = liveness.register("rdkafka", Duration::from_secs(30));
        let sink = KafkaSink::new(&config.kafka, config.kafka_topic.clone(), producer_liveness)
            .await
            .expect("failed to start kafka sink");
        router::router(
            SystemTime {},
            sink,
            liveness,
            max_future_drift,
            config.export_prometheus,
        )
    };

    tracing::info!("listening on {:?}", listener.local_addr().unwrap());
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .unwrap()
}
