use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use common_types::{ActionType, UserAction, ACTION_SCHEMA_VERSION};

use crate::api::CollectError;

/// One interaction as submitted by a caller, before validation. Every field
/// is optional at this stage so that missing values produce precise errors
/// instead of a generic parse failure.
#[derive(Debug, Default, Deserialize)]
pub struct RawAction {
    #[serde(alias = "userId")]
    pub user_id: Option<i64>,
    #[serde(alias = "eventId")]
    pub event_id: Option<i64>,
    #[serde(alias = "action_type", alias = "actionType")]
    pub action: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawAction {
    pub fn from_bytes(bytes: Bytes) -> Result<RawAction, CollectError> {
        tracing::debug!(len = bytes.len(), "decoding new action");
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Validate a raw submission and normalize it into the wire format.
///
/// A missing timestamp is stamped with the gateway's current time; one more
/// than `max_future_drift` ahead of it is rejected as implausible.
pub fn process_action(
    raw: RawAction,
    now: DateTime<Utc>,
    max_future_drift: Duration,
) -> Result<UserAction, CollectError> {
    let user_id = raw.user_id.ok_or(CollectError::MissingUserId)?;
    if user_id <= 0 {
        return Err(CollectError::InvalidUserId(user_id));
    }

    let event_id = raw.event_id.ok_or(CollectError::MissingEventId)?;
    if event_id <= 0 {
        return Err(CollectError::InvalidEventId(event_id));
    }

    let action = raw
        .action
        .ok_or(CollectError::MissingActionType)?
        .parse::<ActionType>()?;

    let timestamp = raw.timestamp.unwrap_or(now);
    if timestamp > now + max_future_drift {
        return Err(CollectError::TimestampTooFarAhead);
    }

    Ok(UserAction {
        version: ACTION_SCHEMA_VERSION,
        user_id,
        event_id,
        action,
        timestamp,
    })
}
