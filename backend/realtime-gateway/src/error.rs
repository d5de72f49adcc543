use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::websocket::ConnectionId;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("missing userId in connection request")]
    MissingUserId,

    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl AppError {
    /// Stable machine-readable code used in JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::MissingUserId => "MISSING_USER_ID",
            AppError::ConnectionClosed(_) => "CONNECTION_CLOSED",
            AppError::Serialization(_) => "SERIALIZATION",
            AppError::Store(_) => "STORE",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::MissingUserId => StatusCode::BAD_REQUEST,
            AppError::ConnectionClosed(_) => StatusCode::GONE,
            AppError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            // Request bodies are decoded by actix extractors; this variant only
            // comes from encoding our own frames.
            AppError::Config(_) | AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_user_id_is_bad_request() {
        let err = AppError::MissingUserId;
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "MISSING_USER_ID");
    }

    #[test]
    fn test_serde_error_conversion() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, AppError::Serialization(_)));
    }

    #[test]
    fn test_frame_encoding_failure_is_server_error() {
        let err = AppError::Serialization("key must be a string".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
