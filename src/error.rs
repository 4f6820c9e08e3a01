//! Typed error surface for the search simulator core.
//!
//! Every public contract returns `Result<T, ApiError>` (or wraps it in
//! `anyhow::Result` at orchestration call sites). `ApiError` maps 1:1 onto
//! the conceptual error kinds in spec.md §7 and each carries the HTTP
//! status its demo binary should answer with.

use axum::http::StatusCode;
use serde::Serialize;

/// A single field-level validation failure, collected (not short-circuited)
/// across a whole validation pass.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("validation failed")]
    ValidationFailed(Vec<FieldError>),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AlreadyExists(_) => StatusCode::CONFLICT,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::PRECONDITION_FAILED,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Cancelled(_) => StatusCode::from_u16(499).unwrap(),
            ApiError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Conceptual error code string used in the `{code, message}` body.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::AlreadyExists(_) => "AlreadyExists",
            ApiError::InvalidRequest(_) => "InvalidRequest",
            ApiError::ValidationFailed(_) => "ValidationFailed",
            ApiError::Conflict(_) => "Conflict",
            ApiError::Unauthorized(_) => "Unauthorized",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::Timeout(_) => "Timeout",
            ApiError::Cancelled(_) => "Cancelled",
            ApiError::UpstreamFailure(_) => "UpstreamFailure",
            ApiError::InternalError(_) => "InternalError",
        }
    }

    pub fn validation(errors: Vec<FieldError>) -> Self {
        ApiError::ValidationFailed(errors)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl From<&ApiError> for ErrorBody {
    fn from(err: &ApiError) -> Self {
        let details = match err {
            ApiError::ValidationFailed(errs) => Some(errs.clone()),
            _ => None,
        };
        ErrorBody {
            code: err.code().to_string(),
            message: err.to_string(),
            details,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
