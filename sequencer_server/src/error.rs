//! Centralized error types for the session server.
//!
//! `AppError` is what REST handlers and the WebSocket handshake return;
//! `PersistenceError` is specific to the hot/cold store layer and is folded
//! into `AppError` at the boundary where persistence is invoked from a
//! handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("cold store quota exceeded, retry after {retry_after_secs}s")]
    QuotaExceeded { retry_after_secs: u64 },

    #[error("persistence io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session is published and immutable")]
    SessionPublished,

    #[error("session is full")]
    CapacityExhausted,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::SessionPublished => "session_published",
            AppError::CapacityExhausted => "capacity_exhausted",
            AppError::Persistence(PersistenceError::NotFound(_)) => "not_found",
            AppError::Persistence(PersistenceError::QuotaExceeded { .. }) => "quota_exceeded",
            AppError::Persistence(_) => "internal_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SessionPublished => StatusCode::CONFLICT,
            AppError::CapacityExhausted => StatusCode::TOO_MANY_REQUESTS,
            AppError::Persistence(PersistenceError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Persistence(PersistenceError::QuotaExceeded { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            AppError::Persistence(PersistenceError::QuotaExceeded { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = self.retry_after_secs();
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert("retry-after", secs.to_string().parse().unwrap());
        }
        response
    }
}
