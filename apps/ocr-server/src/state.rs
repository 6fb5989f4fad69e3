//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::engine::{EngineBackend, EngineManager};
use crate::ocr::OcrPipeline;

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Arc<Config>,
    engine: EngineManager,
    pipeline: OcrPipeline,
}

impl AppState {
    /// Create a new application state
    ///
    /// Creates the upload and output directories. The model is not loaded
    /// here; that happens on the first request or on an explicit download.
    pub async fn new(config: Config, backend: Arc<dyn EngineBackend>) -> Result<Self, StateError> {
        for dir in [&config.storage.upload_dir, &config.storage.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StateError::CreateDir {
                    path: dir.display().to_string(),
                    source,
                })?;
        }

        let config = Arc::new(config);
        let engine = EngineManager::new(backend, config.model.name.clone(), config.model.device);
        let pipeline = OcrPipeline::new(engine.clone(), config.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                engine,
                pipeline,
            }),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the engine lifecycle manager
    pub fn engine(&self) -> &EngineManager {
        &self.inner.engine
    }

    /// Get the OCR pipeline
    pub fn pipeline(&self) -> &OcrPipeline {
        &self.inner.pipeline
    }

    /// Stop background work before the process exits
    pub fn shutdown(&self) {
        tracing::info!("Shutting down application state...");
        self.inner.engine.shutdown();
    }
}
