use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::documents::DocumentError;
use crate::pipeline::{AnalysisOutcome, FailureKind};
use crate::store::PersistenceError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    /// The pipeline ran and produced a failed outcome.
    #[error("Analysis failed")]
    AnalysisFailed(Box<AnalysisOutcome>),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// HTTP status for a failed analysis, by failure kind.
pub fn failure_status(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::ResumeNotFound => StatusCode::NOT_FOUND,
        FailureKind::AuthError | FailureKind::ClientInitError => StatusCode::BAD_GATEWAY,
        FailureKind::RateLimitError => StatusCode::TOO_MANY_REQUESTS,
        FailureKind::NetworkError
        | FailureKind::ServiceError
        | FailureKind::TransientStoreError => StatusCode::SERVICE_UNAVAILABLE,
        FailureKind::InvalidRequest => StatusCode::UNPROCESSABLE_ENTITY,
        FailureKind::ConstraintViolation | FailureKind::StoreError => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::AnalysisFailed(outcome) => {
                let (status, message) = match &outcome.error {
                    Some(detail) => (failure_status(detail.kind), detail.message.clone()),
                    None => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "analysis failed".to_string(),
                    ),
                };
                let body = Json(json!({
                    "error": {
                        "code": "ANALYSIS_FAILED",
                        "message": message
                    },
                    "outcome": outcome
                }));
                return (status, body).into_response();
            }
            AppError::Document(e) => match e {
                DocumentError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "DOCUMENT_NOT_FOUND", e.to_string())
                }
                DocumentError::Storage(msg) => {
                    tracing::error!("S3 error: {msg}");
                    (
                        StatusCode::BAD_GATEWAY,
                        "S3_ERROR",
                        "A storage error occurred".to_string(),
                    )
                }
                DocumentError::UnsupportedType(_)
                | DocumentError::Empty
                | DocumentError::Extraction(_) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "DOCUMENT_ERROR",
                    e.to_string(),
                ),
            },
            AppError::Persistence(e) => match e {
                PersistenceError::ResumeNotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", e.to_string())
                }
                PersistenceError::Transient(_) => {
                    tracing::warn!("Transient database error: {e}");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "DATABASE_UNAVAILABLE",
                        "The database is temporarily unavailable".to_string(),
                    )
                }
                PersistenceError::ConstraintViolation(_) | PersistenceError::Store(_) => {
                    tracing::error!("Database error: {e}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "DATABASE_ERROR",
                        "A database error occurred".to_string(),
                    )
                }
            },
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
