use std::future::ready;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use chrono::Duration;
use tower_http::trace::TraceLayer;

use health::HealthRegistry;

use crate::{collect, sinks::ActionSink, time::TimeSource};

#[derive(Clone)]
pub struct State {
    pub sink: Arc<dyn ActionSink + Send + Sync>,
    pub timesource: Arc<dyn TimeSource + Send + Sync>,
    pub max_future_drift: Duration,
}

async fn index() -> &'static str {
    "action capture"
}

pub fn router<
    TZ: TimeSource + Send + Sync + 'static,
    S: ActionSink + Send + Sync + 'static,
>(
    timesource: TZ,
    sink: S,
    liveness: HealthRegistry,
    max_future_drift: Duration,
    metrics: bool,
) -> Router {
    let state = State {
        sink: Arc::new(sink),
        timesource: Arc::new(timesource),
        max_future_drift,
    };

    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .route("/api/v1/actions", post(collect::submit))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Don't install metrics unless asked to: installing a global recorder
    // when used as a library (during tests etc) does not work well.
    if metrics {
        serve_metrics::setup_metrics_routes(router)
    } else {
        router
    }
}
