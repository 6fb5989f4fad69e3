//! Engine Types
//!
//! Lifecycle phase, status snapshots and the inference call payload.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnginePhase {
    /// Nothing loaded yet
    Unloaded,
    /// A load episode is in flight
    Loading,
    /// Engine loaded and usable
    Ready,
    /// Last load episode failed (retry allowed)
    Failed,
}

impl EnginePhase {
    /// Progress status string exposed to clients
    pub fn progress_status(&self) -> &'static str {
        match self {
            Self::Unloaded => "idle",
            Self::Loading => "downloading",
            Self::Ready => "completed",
            Self::Failed => "error",
        }
    }
}

/// Point-in-time view of the engine lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub phase: EnginePhase,
    /// 0-100
    pub progress: u8,
    pub message: String,
    pub last_error: Option<String>,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            phase: EnginePhase::Unloaded,
            progress: 0,
            message: String::new(),
            last_error: None,
        }
    }
}

impl EngineStatus {
    pub fn is_ready(&self) -> bool {
        self.phase == EnginePhase::Ready
    }

    pub fn is_loading(&self) -> bool {
        self.phase == EnginePhase::Loading
    }
}

/// How a load should be driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Spawn a background task and return immediately
    Background,
    /// Run the load on the caller's task
    Blocking,
}

/// Result of a load request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Engine was already Ready; nothing changed
    AlreadyLoaded,
    /// Another episode is in flight; no new one was started
    InProgress,
    /// A background episode was started
    Started,
    /// A blocking episode ran to completion
    Loaded,
}

/// Attention implementation requested when loading weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttentionImpl {
    #[serde(rename = "flash_attention_2")]
    FlashAttention2,
    #[serde(rename = "eager")]
    Eager,
}

impl AttentionImpl {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlashAttention2 => "flash_attention_2",
            Self::Eager => "eager",
        }
    }
}

impl std::fmt::Display for AttentionImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inference invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferCall {
    pub prompt: String,
    pub image_file: PathBuf,
    pub output_path: PathBuf,
    pub base_size: u32,
    pub image_size: u32,
    pub crop_mode: bool,
    /// Ask the engine to persist its artifacts into `output_path`
    pub save_results: bool,
    pub test_compress: bool,
}

/// Engine error types
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to load tokenizer: {0}")]
    Tokenizer(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Failed to load model with any attention implementation (flash_attention_2: {accelerated}; eager: {baseline})")]
    AttentionExhausted { accelerated: String, baseline: String },

    #[error("Failed to place model on {device}: {reason}")]
    Placement { device: String, reason: String },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Model not available: {0}")]
    Unavailable(String),
}
