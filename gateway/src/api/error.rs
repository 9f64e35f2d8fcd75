//! HTTP-boundary error type.
//!
//! Keeps the crate-wide [`Error`] free of HTTP concerns; handlers return
//! `Result<T, ApiError>` and axum renders the JSON body via `IntoResponse`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::Error;

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidStreamId(_) => ApiError::bad_request(err.to_string()),
            Error::AlreadyExists(_) => ApiError::conflict(err.to_string()),
            Error::AtCapacity(_) => ApiError::service_unavailable(err.to_string()),
            Error::StreamUnavailable(_) => ApiError::not_found(err.to_string()),
            Error::NotFound(_) => ApiError::not_found(err.to_string()),
            Error::InvalidStateTransition { .. } => ApiError::conflict(err.to_string()),
            Error::Configuration(_) => ApiError::bad_request(err.to_string()),
            Error::Extractor(_) | Error::SttProvider(_) | Error::SttNotConnected | Error::Sink(_) => {
                tracing::error!(error = %err, "upstream component error");
                ApiError::internal("upstream component error")
            }
            Error::Database(_) | Error::Serialization(_) | Error::Io(_) | Error::Internal(_) => {
                tracing::error!(error = %err, "internal error");
                ApiError::internal("internal error")
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let api_err: ApiError = Error::not_found("abc").into();
        assert_eq!(api_err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn at_capacity_maps_to_503() {
        let api_err: ApiError = Error::AtCapacity(10).into();
        assert_eq!(api_err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn already_exists_maps_to_409() {
        let api_err: ApiError = Error::AlreadyExists("abc".to_string()).into();
        assert_eq!(api_err.status, StatusCode::CONFLICT);
    }
}
