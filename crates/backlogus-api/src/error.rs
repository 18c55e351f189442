//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use backlogus_core::Error;

/// Error returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    PayloadTooLarge(String),
    Unauthorized(String),
    /// Server-side failure: a human message plus the underlying cause.
    Internal {
        message: String,
        error: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiError {
    /// Map a core error, using `context` as the message for server-side failures.
    pub fn with_context(err: Error, context: &str) -> Self {
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            err if err.is_client_error() => ApiError::BadRequest(err.to_string()),
            err => ApiError::Internal {
                message: context.to_string(),
                error: Some(err.to_string()),
            },
        }
    }

    /// Rejection for an upload above `max_bytes`.
    pub fn upload_too_large(max_bytes: usize) -> Self {
        const MB: usize = 1024 * 1024;
        let limit = if max_bytes >= MB {
            format!("{} MB", max_bytes / MB)
        } else {
            format!("{} byte", max_bytes)
        };
        ApiError::PayloadTooLarge(format!("Backup file exceeds the {} upload limit", limit))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::with_context(err, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::NotFound(message)
            | ApiError::BadRequest(message)
            | ApiError::PayloadTooLarge(message)
            | ApiError::Unauthorized(message) => ErrorBody {
                message,
                error: None,
            },
            ApiError::Internal { message, error } => ErrorBody { message, error },
        };

        (status, Json(body)).into_response()
    }
}
