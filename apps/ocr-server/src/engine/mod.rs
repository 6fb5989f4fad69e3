//! Engine Module
//!
//! Lifecycle management for the single OCR inference engine.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ocr_server::engine::{EngineManager, LoadMode, RemoteEngine};
//!
//! let backend = Arc::new(RemoteEngine::new("http://127.0.0.1:8001"));
//! let manager = EngineManager::new(backend, "deepseek-ai/DeepSeek-OCR", Device::Cuda);
//!
//! // Kick off a download without waiting
//! manager.request_load(LoadMode::Background).await?;
//!
//! // Poll progress
//! let status = manager.status();
//!
//! // Or block until the engine is usable
//! let engine = manager.ensure_ready().await?;
//! ```

mod backend;
mod lifecycle;
mod remote;
mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use backend::{EngineBackend, EngineHandle, OcrModel, Tokenizer};
pub use lifecycle::EngineManager;
pub use remote::RemoteEngine;
pub use types::{
    AttentionImpl, EngineError, EnginePhase, EngineStatus, InferCall, LoadMode, LoadOutcome,
};
