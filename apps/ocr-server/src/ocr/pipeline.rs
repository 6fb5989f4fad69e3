//! OCR Pipeline
//!
//! Runs one request end to end: readiness gate, validation, staging, engine
//! invocation and result extraction. Steps run strictly in order and each may
//! cut the rest short. From staging onwards every failure removes the staged
//! input; the output directory is left for the maintenance sweep.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use super::staging::{file_extension, new_request_id, sanitize_filename, StagedInput, RESULT_FILE};
use super::types::{InferenceRequest, InferenceResult, OcrError, ResultMetadata};
use crate::config::Config;
use crate::engine::{EngineError, EngineManager, InferCall};

/// OCR request pipeline
#[derive(Clone)]
pub struct OcrPipeline {
    engine: EngineManager,
    config: Arc<Config>,
}

impl OcrPipeline {
    pub fn new(engine: EngineManager, config: Arc<Config>) -> Self {
        Self { engine, config }
    }

    pub async fn process(&self, request: InferenceRequest) -> Result<InferenceResult, OcrError> {
        let engine = self.engine.ensure_ready().await.map_err(|e| {
            OcrError::ServiceUnavailable(match e {
                EngineError::Unavailable(detail) => detail,
                other => other.to_string(),
            })
        })?;

        let limits = &self.config.limits;
        let extension = file_extension(&request.filename);
        if !limits.is_allowed(&extension) {
            return Err(OcrError::UnsupportedExtension {
                extension,
                allowed: limits
                    .allowed_extensions
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        let request_id = new_request_id();
        let unique_name = format!("{}_{}", request_id, sanitize_filename(&request.filename));
        let staged = StagedInput::write(&self.config.storage.upload_dir, unique_name, &request.data)
            .await
            .map_err(|e| internal("Failed to stage upload", e))?;

        let file_size = staged
            .size()
            .await
            .map_err(|e| internal("Failed to stat staged upload", e))?;
        if file_size > limits.max_file_size {
            return Err(OcrError::FileTooLarge {
                size: file_size,
                max: limits.max_file_size_mb(),
            });
        }

        let image_size = read_dimensions(staged.path().to_path_buf()).await?;

        let prompt = self
            .config
            .prompts
            .resolve(request.mode, request.custom_prompt.as_deref());

        let output_dir = self.config.storage.output_dir.join(&request_id);
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| internal("Failed to create output directory", e))?;

        let image = &self.config.image;
        let call = InferCall {
            prompt: prompt.clone(),
            image_file: staged.path().to_path_buf(),
            output_path: output_dir.clone(),
            base_size: image.base_size,
            image_size: image.image_size,
            crop_mode: image.crop_mode,
            save_results: true,
            test_compress: true,
        };

        tracing::info!(
            request_id = %request_id,
            unique_id = %staged.unique_name(),
            mode = %request.mode,
            "Processing OCR request"
        );
        let started = Instant::now();
        let returned = engine
            .infer(&call)
            .await
            .map_err(|e| internal("Inference failed", e))?;
        let elapsed = started.elapsed().as_secs_f64();
        tracing::info!(request_id = %request_id, "Processed in {:.2}s", elapsed);

        let text = read_result(&output_dir, returned).await;
        let unique_id = staged.unique_name().to_string();

        // Success keeps the staged input next to its outputs
        staged.keep();

        Ok(InferenceResult {
            success: true,
            text,
            mode: request.mode,
            prompt,
            processing_time: (elapsed * 100.0).round() / 100.0,
            image_size,
            file_size,
            timestamp: request_id,
            output_dir,
            metadata: ResultMetadata {
                filename: request.filename,
                unique_id,
                device: self.engine.device().to_string(),
            },
        })
    }
}

/// Log the full error and surface a generic internal failure
fn internal(context: &str, error: impl std::fmt::Display) -> OcrError {
    tracing::error!(error = %error, "{}", context);
    OcrError::Internal(format!("{}: {}", context, error))
}

/// Decode the image header and return (width, height)
async fn read_dimensions(path: PathBuf) -> Result<(u32, u32), OcrError> {
    tokio::task::spawn_blocking(move || {
        image::ImageReader::open(&path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|e| e.to_string())?
            .into_dimensions()
            .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| internal("Image decoding task failed", e))?
    .map_err(OcrError::InvalidImage)
}

/// A non-empty result file wins over the engine's return value
async fn read_result(output_dir: &Path, returned: String) -> String {
    match tokio::fs::read_to_string(output_dir.join(RESULT_FILE)).await {
        Ok(contents) if !contents.is_empty() => contents,
        _ => returned,
    }
}

// ============================================================================
// Tests
// ============================================================================
