//! OCR routes
//!
//! Endpoints:
//! - POST /api/ocr - Run OCR on an uploaded image (multipart)
//! - GET /api/modes - List the available OCR modes

use std::collections::BTreeMap;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::ocr::{InferenceRequest, InferenceResult, ModeInfo, OcrError, OcrMode};
use crate::state::AppState;

/// Create the OCR router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ocr", post(run_ocr))
        .route("/modes", get(list_modes))
}

/// Fields: `file` (required), `mode` (defaults to markdown), `custom_prompt`.
async fn run_ocr(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<InferenceResult>, OcrError> {
    let mut multipart = multipart.map_err(|e| OcrError::InvalidRequest(e.body_text()))?;
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut mode = OcrMode::default();
    let mut custom_prompt = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| OcrError::InvalidRequest(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| OcrError::InvalidRequest(format!("Failed to read file: {}", e)))?;
                file = Some((filename, data.to_vec()));
            }
            "mode" => {
                let value = read_text(field).await?;
                mode = value.parse().unwrap_or_else(|_| {
                    tracing::warn!(mode = %value, "Unknown OCR mode, using markdown");
                    OcrMode::Markdown
                });
            }
            "custom_prompt" => {
                custom_prompt = Some(read_text(field).await?);
            }
            _ => {}
        }
    }

    let (filename, data) =
        file.ok_or_else(|| OcrError::InvalidRequest("No file provided".to_string()))?;

    let result = state
        .pipeline()
        .process(InferenceRequest {
            data,
            filename,
            mode,
            custom_prompt,
        })
        .await?;

    Ok(Json(result))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, OcrError> {
    field
        .text()
        .await
        .map_err(|e| OcrError::InvalidRequest(format!("Failed to read field: {}", e)))
}

#[derive(Serialize)]
struct ModesResponse {
    modes: BTreeMap<&'static str, ModeInfo>,
}

async fn list_modes() -> Json<ModesResponse> {
    Json(ModesResponse {
        modes: OcrMode::ALL.iter().map(|m| (m.as_str(), m.info())).collect(),
    })
}
