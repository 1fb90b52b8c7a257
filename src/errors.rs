use crate::services::metabase::MetabaseError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// An HTTP-facing error: a status code plus a message for the JSON body.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<MetabaseError> for AppError {
    fn from(err: MetabaseError) -> Self {
        match err {
            MetabaseError::InvalidRequest(_) => AppError::bad_request(err.to_string()),
            MetabaseError::RetriesExhausted { .. } | MetabaseError::Canceled => {
                AppError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            MetabaseError::Conflict | MetabaseError::Backend(_) => {
                tracing::error!("metabase failure: {}", err);
                AppError::internal(err.to_string())
            }
        }
    }
}
