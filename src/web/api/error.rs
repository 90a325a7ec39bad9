use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{tracks::TrackError, web::auth::FeedAccessDenied};

#[derive(Debug)]
pub enum ApiError {
    Forbidden(FeedAccessDenied),
    Validation(String),
    NotFound(&'static str),
    Conflict(&'static str),
    Unavailable(&'static str),
}

impl From<FeedAccessDenied> for ApiError {
    fn from(e: FeedAccessDenied) -> Self {
        ApiError::Forbidden(e)
    }
}

impl From<TrackError> for ApiError {
    fn from(e: TrackError) -> Self {
        match e {
            TrackError::AlreadyRunning => ApiError::Conflict("feed_running"),
            TrackError::StaleResult { .. } => ApiError::Conflict("stale_result"),
            TrackError::Transport(_) => ApiError::Unavailable("transport_error"),
            TrackError::MalformedSample(msg) => ApiError::Validation(msg),
            TrackError::InvalidPayload(e) => ApiError::Validation(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Forbidden(e) => e.into_response(),
            ApiError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::with_message("validation_failed", &msg)),
            )
                .into_response(),
            ApiError::NotFound(reason) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse::new(reason))).into_response()
            }
            ApiError::Conflict(reason) => {
                (StatusCode::CONFLICT, Json(ErrorResponse::new(reason))).into_response()
            }
            ApiError::Unavailable(reason) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new(reason)),
            )
                .into_response(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: &str) -> Self {
        ErrorResponse {
            error: error.to_string(),
            message: None,
        }
    }

    pub fn with_message(error: &str, message: &str) -> Self {
        ErrorResponse {
            error: error.to_string(),
            message: Some(message.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_errors_map_to_statuses() {
        let status = |e: TrackError| ApiError::from(e).into_response().status();
        assert_eq!(status(TrackError::AlreadyRunning), StatusCode::CONFLICT);
        assert_eq!(
            status(TrackError::transport("down")),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(TrackError::malformed("missing 'droneId'")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("track_not_found").into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
