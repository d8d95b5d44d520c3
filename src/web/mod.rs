//! HTTP surface: upload, generic CRUD and a few read-only endpoints.

pub mod extract;
pub mod handlers;
pub mod router;

pub use router::{AppState, ListLimits, build_router};

use crate::core::DbError;
use crate::registry::RegistryError;
use crate::repository::RepositoryError;
use crate::security::SecurityError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum WebError {
    Validation(String),
    NotRegistered(String),
    NotFound(String),
    Unauthenticated(String),
    Forbidden(String),
    Storage(String),
}

impl From<RepositoryError> for WebError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Validation(message) => Self::Validation(message),
            RepositoryError::NotRegistered(name) => {
                Self::NotRegistered(format!("Collection '{}' not found", name))
            }
            RepositoryError::Registry(err @ RegistryError::InvalidName(_)) => {
                Self::Validation(err.to_string())
            }
            RepositoryError::Registry(err @ RegistryError::LockError(_)) => {
                Self::Storage(err.to_string())
            }
            RepositoryError::Storage(err) => Self::from(err),
        }
    }
}

impl From<DbError> for WebError {
    fn from(err: DbError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<SecurityError> for WebError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::Unauthenticated(_) => Self::Unauthenticated(err.to_string()),
            SecurityError::Forbidden { .. } => Self::Forbidden(err.to_string()),
            SecurityError::Configuration(_) => Self::Storage(err.to_string()),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            WebError::Validation(msg) => (StatusCode::BAD_REQUEST, msg, "validation_error"),
            WebError::NotRegistered(msg) => (StatusCode::NOT_FOUND, msg, "not_registered"),
            WebError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "not_found"),
            WebError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg, "unauthenticated"),
            WebError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "forbidden"),
            WebError::Storage(msg) => {
                error!(error = %msg, "storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, msg, "storage_failure")
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;
