//! Error types for the OCR server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::cleanup::SweepError;
use crate::engine::EngineError;
use crate::ocr::{ErrorKind, OcrError};

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Sweep(#[from] SweepError),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
    kind: ErrorKind,
}

impl IntoResponse for OcrError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = match &self {
            OcrError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                "Error processing image".to_string()
            }
            other => {
                tracing::warn!(code = other.code(), "{}", other);
                other.to_string()
            }
        };

        let body = Json(ErrorResponse {
            error,
            code: self.code(),
            kind: self.kind(),
        });

        (status, body).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, kind, error) = match self {
            AppError::Ocr(e) => return e.into_response(),
            AppError::Engine(e) => {
                tracing::error!("Engine error: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "MODEL_UNAVAILABLE",
                    ErrorKind::ServiceUnavailable,
                    e.to_string(),
                )
            }
            AppError::Sweep(e) => {
                tracing::error!("Cleanup error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CLEANUP_FAILED",
                    ErrorKind::InternalFailure,
                    "Cleanup failed".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse { error, code, kind });

        (status, body).into_response()
    }
}
