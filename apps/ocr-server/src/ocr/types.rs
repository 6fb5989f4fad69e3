//! OCR Types
//!
//! Modes, prompt templates, requests/results and errors for the OCR pipeline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Modes & Prompts
// ============================================================================

/// OCR output style preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrMode {
    /// Plain text, no structure
    FreeOcr,
    /// Document converted to Markdown
    Markdown,
    /// Text with bounding box coordinates
    Grounding,
    /// Figures, charts and tables
    ParseFigure,
    /// Free-form description of the image
    Detailed,
}

impl Default for OcrMode {
    fn default() -> Self {
        Self::Markdown
    }
}

impl OcrMode {
    pub const ALL: [OcrMode; 5] = [
        Self::FreeOcr,
        Self::Markdown,
        Self::Grounding,
        Self::ParseFigure,
        Self::Detailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FreeOcr => "free_ocr",
            Self::Markdown => "markdown",
            Self::Grounding => "grounding",
            Self::ParseFigure => "parse_figure",
            Self::Detailed => "detailed",
        }
    }

    pub fn info(&self) -> ModeInfo {
        let (description, speed, use_case) = match self {
            Self::FreeOcr => ("Fast OCR without structure", "fast", "General text extraction"),
            Self::Markdown => (
                "Converts the document to structured Markdown",
                "medium",
                "Formatted documents",
            ),
            Self::Grounding => (
                "OCR with bounding box coordinates",
                "slow",
                "Detailed analysis with locations",
            ),
            Self::ParseFigure => (
                "Extracts information from figures and diagrams",
                "medium",
                "Charts, tables, diagrams",
            ),
            Self::Detailed => (
                "Detailed description of the image",
                "very fast",
                "Visual content analysis",
            ),
        };
        ModeInfo {
            description,
            speed,
            use_case,
        }
    }
}

impl FromStr for OcrMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| format!("Unknown OCR mode: {}", s))
    }
}

impl std::fmt::Display for OcrMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable description of a mode
#[derive(Debug, Clone, Serialize)]
pub struct ModeInfo {
    pub description: &'static str,
    pub speed: &'static str,
    pub use_case: &'static str,
}

/// Mode -> prompt template mapping
#[derive(Debug, Clone)]
pub struct PromptTable {
    templates: HashMap<OcrMode, String>,
}

/// Used when the table has neither the requested mode nor markdown
const MARKDOWN_PROMPT: &str = "<image>\n<|grounding|>Convert the document to markdown. ";

impl Default for PromptTable {
    fn default() -> Self {
        Self::from_templates([
            (OcrMode::FreeOcr, "<image>\nFree OCR. "),
            (OcrMode::Markdown, MARKDOWN_PROMPT),
            (OcrMode::Grounding, "<image>\n<|grounding|>OCR this image. "),
            (OcrMode::ParseFigure, "<image>\nParse the figure. "),
            (OcrMode::Detailed, "<image>\nDescribe this image in detail. "),
        ])
    }
}

impl PromptTable {
    pub fn from_templates<I, S>(templates: I) -> Self
    where
        I: IntoIterator<Item = (OcrMode, S)>,
        S: Into<String>,
    {
        Self {
            templates: templates
                .into_iter()
                .map(|(mode, template)| (mode, template.into()))
                .collect(),
        }
    }

    pub fn template(&self, mode: OcrMode) -> Option<&str> {
        self.templates.get(&mode).map(String::as_str)
    }

    /// A non-empty custom prompt wins; otherwise the mode's template, falling
    /// back to the markdown template
    pub fn resolve(&self, mode: OcrMode, custom_prompt: Option<&str>) -> String {
        if let Some(custom) = custom_prompt.filter(|p| !p.is_empty()) {
            return custom.to_string();
        }
        self.template(mode)
            .or_else(|| self.template(OcrMode::Markdown))
            .unwrap_or(MARKDOWN_PROMPT)
            .to_string()
    }
}

// ============================================================================
// Request / Result
// ============================================================================

/// One OCR request
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    /// Uploaded bytes
    pub data: Vec<u8>,
    /// Filename declared by the client
    pub filename: String,
    pub mode: OcrMode,
    pub custom_prompt: Option<String>,
}

/// Successful OCR response
#[derive(Debug, Clone, Serialize)]
pub struct InferenceResult {
    pub success: bool,
    pub text: String,
    pub mode: OcrMode,
    pub prompt: String,
    /// Seconds, rounded to hundredths
    pub processing_time: f64,
    /// (width, height) in pixels
    pub image_size: (u32, u32),
    /// Staged file size in bytes
    pub file_size: u64,
    /// Request identifier shared by the staged input and output directory
    pub timestamp: String,
    pub output_dir: PathBuf,
    pub metadata: ResultMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultMetadata {
    pub filename: String,
    pub unique_id: String,
    pub device: String,
}

// ============================================================================
// Error Types
// ============================================================================

/// Error categories surfaced to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    ServiceUnavailable,
    InternalFailure,
}

/// OCR error types
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("File type not allowed: '{extension}'. Use: {allowed}")]
    UnsupportedExtension { extension: String, allowed: String },

    #[error("File too large. Maximum: {max}")]
    FileTooLarge { size: u64, max: String },

    #[error("File is not a valid image: {0}")]
    InvalidImage(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Model not available: {0}")]
    ServiceUnavailable(String),

    #[error("Error processing image: {0}")]
    Internal(String),
}

impl OcrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedExtension { .. }
            | Self::FileTooLarge { .. }
            | Self::InvalidImage(_)
            | Self::InvalidRequest(_) => ErrorKind::InvalidInput,
            Self::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            Self::Internal(_) => ErrorKind::InternalFailure,
        }
    }

    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self.kind() {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::InternalFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedExtension { .. } => "INVALID_FILE_TYPE",
            Self::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Self::InvalidImage(_) => "INVALID_IMAGE",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::ServiceUnavailable(_) => "MODEL_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_prompt_overrides_mode() {
        let table = PromptTable::default();
        assert_eq!(table.resolve(OcrMode::Grounding, Some("Read the totals")), "Read the totals");
    }

    #[test]
    fn test_empty_custom_prompt_uses_table() {
        let table = PromptTable::default();
        assert_eq!(
            table.resolve(OcrMode::FreeOcr, Some("")),
            "<image>\nFree OCR. "
        );
    }

    #[test]
    fn test_missing_mode_falls_back_to_markdown() {
        let table = PromptTable::from_templates([(OcrMode::Markdown, "md template")]);
        assert_eq!(table.resolve(OcrMode::Detailed, None), "md template");
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("parse_figure".parse::<OcrMode>().unwrap(), OcrMode::ParseFigure);
        assert!("handwriting".parse::<OcrMode>().is_err());
        assert_eq!(OcrMode::default(), OcrMode::Markdown);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(OcrError::InvalidImage("x".into()).kind(), ErrorKind::InvalidInput);
        assert_eq!(
            OcrError::ServiceUnavailable("x".into()).status_code(),
            axum::http::StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(OcrError::Internal("x".into()).kind(), ErrorKind::InternalFailure);
    }
}
