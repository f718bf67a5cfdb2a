//! Per-request error types and their HTTP mapping.
//!
//! Startup and configuration paths use `anyhow`; everything that can fail
//! while serving a request is one of the enums below so the handler can pick
//! a status code.

use crate::types::ErrorBody;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

/// Failure inside the preprocessing or prediction step.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("missing feature column `{0}`")]
    MissingFeature(String),

    #[error("feature `{column}` at row {row}: expected {expected}, got {found}")]
    TypeMismatch {
        column: String,
        row: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("feature `{column}` at row {row} is null and has no imputation value")]
    MissingValue { column: String, row: usize },

    #[error("feature `{column}` at row {row}: unknown category `{value}`")]
    UnknownCategory {
        column: String,
        row: usize,
        value: String,
    },

    #[error("feature matrix has {found} columns, model expects {expected}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("model runtime error: {0}")]
    Runtime(String),
}

impl InferenceError {
    /// Whether the failure was caused by the caller's input rather than the model.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, InferenceError::Runtime(_))
    }
}

/// Errors surfaced by the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("malformed request: {message}")]
    MalformedRequest { status: StatusCode, message: String },

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("artifacts are not loaded")]
    NotReady,

    #[error("inference task failed: {0}")]
    Task(String),
}

impl ServeError {
    pub fn malformed(message: impl Into<String>) -> Self {
        ServeError::MalformedRequest {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::MalformedRequest { status, .. } => *status,
            ServeError::Inference(e) if e.is_client_error() => StatusCode::UNPROCESSABLE_ENTITY,
            ServeError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServeError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ServeError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label used for the `invocation_errors_total` counter.
    pub fn kind(&self) -> &'static str {
        match self {
            ServeError::MalformedRequest { .. } => "malformed",
            ServeError::Inference(e) if e.is_client_error() => "schema",
            ServeError::Inference(_) => "model",
            ServeError::NotReady => "not_ready",
            ServeError::Task(_) => "task",
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, status = status.as_u16(), "Invocation failed");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServeError::malformed("bad").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServeError::from(InferenceError::MissingFeature("age".into())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServeError::from(InferenceError::Runtime("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ServeError::NotReady.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(ServeError::malformed("x").kind(), "malformed");
        assert_eq!(
            ServeError::from(InferenceError::ShapeMismatch {
                expected: 3,
                found: 2
            })
            .kind(),
            "schema"
        );
        assert_eq!(
            ServeError::from(InferenceError::Runtime("x".into())).kind(),
            "model"
        );
    }
}
