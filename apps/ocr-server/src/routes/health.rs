//! Service info and health endpoints

use std::collections::BTreeMap;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::engine::EngineStatus;
use crate::state::AppState;

/// Create the health router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
}

#[derive(Serialize)]
struct ServiceInfo {
    service: &'static str,
    version: &'static str,
    status: &'static str,
    model: String,
    model_loaded: bool,
    device: &'static str,
    endpoints: BTreeMap<&'static str, &'static str>,
}

async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    let engine = state.engine();
    Json(ServiceInfo {
        service: "OCR Server",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        model: engine.model_id().to_string(),
        model_loaded: engine.is_ready(),
        device: engine.device().as_str(),
        endpoints: BTreeMap::from([
            ("health", "GET /health"),
            ("download_model", "POST /api/download-model"),
            ("download_progress", "GET /api/download-progress"),
            ("ocr", "POST /api/ocr"),
            ("modes", "GET /api/modes"),
            ("cleanup", "DELETE /api/cleanup"),
        ]),
    })
}

/// Load progress as reported to clients
#[derive(Debug, Serialize)]
pub struct ProgressBody {
    pub status: &'static str,
    pub progress: u8,
    pub message: String,
}

impl From<&EngineStatus> for ProgressBody {
    fn from(status: &EngineStatus) -> Self {
        Self {
            status: status.phase.progress_status(),
            progress: status.progress,
            message: status.message.clone(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
    model_loading: bool,
    model_error: Option<String>,
    download_progress: ProgressBody,
    device: &'static str,
    timestamp: String,
}

/// Never waits on a load in progress.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.engine().status();
    Json(HealthResponse {
        status: "healthy",
        model_loaded: status.is_ready(),
        model_loading: status.is_loading(),
        model_error: status.last_error.clone(),
        download_progress: ProgressBody::from(&status),
        device: state.engine().device().as_str(),
        timestamp: chrono::Local::now().to_rfc3339(),
    })
}
