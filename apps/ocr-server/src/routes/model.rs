//! Model download routes
//!
//! Endpoints:
//! - POST /api/download-model - Start loading the model in the background
//! - GET /api/download-progress - Poll load progress

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use super::health::ProgressBody;
use crate::engine::{LoadMode, LoadOutcome};
use crate::error::Result;
use crate::state::AppState;

/// Create the model router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/download-model", post(download_model))
        .route("/download-progress", get(download_progress))
}

#[derive(Serialize)]
struct DownloadResponse {
    status: &'static str,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<ProgressBody>,
}

/// Trigger a background load. Repeated calls never start a second episode.
async fn download_model(State(state): State<AppState>) -> Result<Json<DownloadResponse>> {
    let outcome = state.engine().request_load(LoadMode::Background).await?;

    let response = match outcome {
        LoadOutcome::AlreadyLoaded | LoadOutcome::Loaded => DownloadResponse {
            status: "already_loaded",
            message: "Model already loaded",
            progress: None,
        },
        LoadOutcome::InProgress => DownloadResponse {
            status: "downloading",
            message: "Download in progress",
            progress: Some(ProgressBody::from(&state.engine().status())),
        },
        LoadOutcome::Started => {
            tracing::info!(model = state.engine().model_id(), "Model download started");
            DownloadResponse {
                status: "started",
                message: "Download started",
                progress: None,
            }
        }
    };

    Ok(Json(response))
}

#[derive(Serialize)]
struct ProgressResponse {
    model_loaded: bool,
    model_loading: bool,
    progress: ProgressBody,
}

async fn download_progress(State(state): State<AppState>) -> Json<ProgressResponse> {
    let status = state.engine().status();
    Json(ProgressResponse {
        model_loaded: status.is_ready(),
        model_loading: status.is_loading(),
        progress: ProgressBody::from(&status),
    })
}
