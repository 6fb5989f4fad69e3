//! OCR Module
//!
//! Request pipeline for the OCR engine: validation, prompt resolution, staged
//! execution and result extraction.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ocr_server::ocr::{InferenceRequest, OcrMode, OcrPipeline};
//!
//! let pipeline = OcrPipeline::new(engine_manager, Arc::new(config));
//!
//! let result = pipeline.process(InferenceRequest {
//!     data: bytes,
//!     filename: "invoice.jpg".to_string(),
//!     mode: OcrMode::Markdown,
//!     custom_prompt: None,
//! }).await?;
//! ```

mod pipeline;
mod staging;
mod types;

pub use pipeline::OcrPipeline;
pub use staging::{file_extension, new_request_id, sanitize_filename, StagedInput, RESULT_FILE};
pub use types::{
    ErrorKind, InferenceRequest, InferenceResult, ModeInfo, OcrError, OcrMode, PromptTable,
    ResultMetadata,
};
