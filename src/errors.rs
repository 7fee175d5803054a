use crate::{services::namespace_service::NamespaceError, store::StoreError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for handler errors that keeps the message local.
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

impl From<NamespaceError> for AppError {
    fn from(err: NamespaceError) -> Self {
        let status = match &err {
            NamespaceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            NamespaceError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            NamespaceError::Store(StoreError::InvalidToken) => StatusCode::BAD_REQUEST,
            NamespaceError::Store(StoreError::Backend(_)) => StatusCode::BAD_GATEWAY,
        };
        AppError::new(status, err.to_string())
    }
}
