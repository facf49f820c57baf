use axum::extract::State;
use axum::Json;
use bytes::Bytes;
use metrics::counter;
use tracing::instrument;

use crate::action::{process_action, RawAction};
use crate::api::{CollectError, CollectResponse, CollectResponseCode};
use crate::router;

pub fn report_dropped_actions(cause: &'static str, count: u64) {
    counter!("capture_actions_dropped_total", &[("cause", cause)]).increment(count);
}

/// `POST /api/v1/actions`: validate one submitted interaction, normalize it
/// into the wire format and publish it keyed by user id. The response is not
/// sent until the sink acknowledges the hand-off.
#[instrument(skip_all, fields(user_id, event_id, action))]
pub async fn submit(
    state: State<router::State>,
    body: Bytes,
) -> Result<Json<CollectResponse>, CollectError> {
    counter!("capture_actions_received_total").increment(1);

    let raw = RawAction::from_bytes(body).map_err(|err| {
        report_dropped_actions("invalid_payload", 1);
        err
    })?;

    let now = state.timesource.current_time();
    let action = process_action(raw, now, state.max_future_drift).map_err(|err| {
        report_dropped_actions("validation_failed", 1);
        tracing::debug!("rejected action: {}", err);
        err
    })?;

    tracing::Span::current().record("user_id", action.user_id);
    tracing::Span::current().record("event_id", action.event_id);
    tracing::Span::current().record("action", action.action.to_string().as_str());

    state.sink.send(action).await?;

    Ok(Json(CollectResponse {
        status: CollectResponseCode::Ok,
    }))
}
