// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::models::token::TokenRejection;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict: operating on a survey in the wrong lifecycle state
    // (e.g. activating a closed survey).
    InvalidState(String),

    // Token rejections (one 404, two 400s).
    TokenNotFound,
    TokenAlreadyUsed,
    TokenExpired,

    // 400: finalize called on an already-completed response.
    AlreadyCompleted,

    // 400: partial save attempted after finalization when the survey does
    // not allow multiple responses.
    ResponseClosed,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, msg),
            AppError::TokenNotFound => (
                StatusCode::NOT_FOUND,
                "survey token not found".to_string(),
            ),
            AppError::TokenAlreadyUsed => (
                StatusCode::BAD_REQUEST,
                "survey token has already been used".to_string(),
            ),
            AppError::TokenExpired => (
                StatusCode::BAD_REQUEST,
                "survey token has expired".to_string(),
            ),
            AppError::AlreadyCompleted => (
                StatusCode::BAD_REQUEST,
                "response has already been completed".to_string(),
            ),
            AppError::ResponseClosed => (
                StatusCode::BAD_REQUEST,
                "response is closed; this survey does not allow multiple responses".to_string(),
            ),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<TokenRejection> for AppError {
    fn from(rejection: TokenRejection) -> Self {
        match rejection {
            TokenRejection::NotFound => AppError::TokenNotFound,
            TokenRejection::AlreadyUsed => AppError::TokenAlreadyUsed,
            TokenRejection::Expired => AppError::TokenExpired,
        }
    }
}
