use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use common_types::ParseActionTypeError;

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum CollectResponseCode {
    Ok = 1,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CollectResponse {
    pub status: CollectResponseCode,
}

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("failed to decode request: {0}")]
    RequestDecodingError(String),
    #[error("failed to parse request: {0}")]
    RequestParsingError(#[from] serde_json::Error),

    #[error("action submitted without a user_id")]
    MissingUserId,
    #[error("{0} is not a valid user_id")]
    InvalidUserId(i64),
    #[error("action submitted without an event_id")]
    MissingEventId,
    #[error("{0} is not a valid event_id")]
    InvalidEventId(i64),
    #[error("action submitted without an action type")]
    MissingActionType,
    #[error(transparent)]
    UnknownActionType(#[from] ParseActionTypeError),
    #[error("action timestamp is too far in the future")]
    TimestampTooFarAhead,

    #[error("transient error, please retry")]
    RetryableSinkError,
    #[error("maximum action size exceeded")]
    ActionTooBig,
    #[error("invalid action could not be published")]
    NonRetryableSinkError,
}

impl IntoResponse for CollectError {
    fn into_response(self) -> Response {
        match self {
            CollectError::RequestDecodingError(_)
            | CollectError::RequestParsingError(_)
            | CollectError::MissingUserId
            | CollectError::InvalidUserId(_)
            | CollectError::MissingEventId
            | CollectError::InvalidEventId(_)
            | CollectError::MissingActionType
            | CollectError::UnknownActionType(_)
            | CollectError::TimestampTooFarAhead
            | CollectError::ActionTooBig
            | CollectError::NonRetryableSinkError => (StatusCode::BAD_REQUEST, self.to_string()),

            CollectError::RetryableSinkError => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
        }
        .into_response()
    }
}
