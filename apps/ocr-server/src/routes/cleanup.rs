//! Maintenance routes
//!
//! Endpoints:
//! - DELETE /api/cleanup?days=7 - Remove uploads and outputs older than `days`

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::delete,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::cleanup::sweep;
use crate::error::{AppError, Result};
use crate::ocr::OcrError;
use crate::state::AppState;

const DEFAULT_MAX_AGE_DAYS: u32 = 7;

/// Create the cleanup router
pub fn router() -> Router<AppState> {
    Router::new().route("/cleanup", delete(cleanup))
}

#[derive(Debug, Deserialize)]
struct CleanupQuery {
    days: Option<u32>,
}

#[derive(Serialize)]
struct Cleaned {
    uploads: usize,
    outputs: usize,
}

#[derive(Serialize)]
struct CleanupResponse {
    success: bool,
    cleaned: Cleaned,
    days: u32,
}

async fn cleanup(
    State(state): State<AppState>,
    query: std::result::Result<Query<CleanupQuery>, QueryRejection>,
) -> Result<Json<CleanupResponse>> {
    let Query(query) =
        query.map_err(|e| AppError::Ocr(OcrError::InvalidRequest(e.body_text())))?;
    let days = query.days.unwrap_or(DEFAULT_MAX_AGE_DAYS);
    let storage = &state.config().storage;
    let report = sweep(&storage.upload_dir, &storage.output_dir, days).await?;

    Ok(Json(CleanupResponse {
        success: true,
        cleaned: Cleaned {
            uploads: report.uploads,
            outputs: report.outputs,
        },
        days,
    }))
}
