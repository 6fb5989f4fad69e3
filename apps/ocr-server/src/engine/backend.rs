//! Engine Backend
//!
//! The inference engine is an external collaborator. These traits are the
//! seam between the lifecycle manager and whatever actually hosts the model.

use std::sync::Arc;

use async_trait::async_trait;

use super::types::{AttentionImpl, EngineError, InferCall};
use crate::config::{Device, Precision};

/// Loads the pieces of a pretrained model
#[async_trait]
pub trait EngineBackend: Send + Sync {
    /// Acquire tokenizer and preprocessing artifacts
    async fn load_tokenizer(&self, model_id: &str) -> Result<Arc<dyn Tokenizer>, EngineError>;

    /// Acquire model weights with the given attention implementation
    async fn load_model(
        &self,
        model_id: &str,
        attention: AttentionImpl,
    ) -> Result<Box<dyn OcrModel>, EngineError>;
}

/// A loaded model
#[async_trait]
pub trait OcrModel: Send + Sync {
    /// Move the model to a device and precision, switching to eval mode
    async fn place(&mut self, device: Device, precision: Precision) -> Result<(), EngineError>;

    /// Run one inference call; the engine may also write `result.mmd`
    /// into `call.output_path`
    async fn infer(&self, tokenizer: &dyn Tokenizer, call: &InferCall) -> Result<String, EngineError>;
}

/// Opaque tokenizer handle
pub trait Tokenizer: Send + Sync {
    fn id(&self) -> &str;
}

/// Model and tokenizer bundled together, shared read-only once Ready
#[derive(Clone)]
pub struct EngineHandle {
    model: Arc<dyn OcrModel>,
    tokenizer: Arc<dyn Tokenizer>,
    attention: AttentionImpl,
    device: Device,
}

impl EngineHandle {
    pub fn new(
        model: Box<dyn OcrModel>,
        tokenizer: Arc<dyn Tokenizer>,
        attention: AttentionImpl,
        device: Device,
    ) -> Self {
        Self {
            model: Arc::from(model),
            tokenizer,
            attention,
            device,
        }
    }

    pub fn attention(&self) -> AttentionImpl {
        self.attention
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub async fn infer(&self, call: &InferCall) -> Result<String, EngineError> {
        self.model.infer(self.tokenizer.as_ref(), call).await
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("tokenizer", &self.tokenizer.id())
            .field("attention", &self.attention)
            .field("device", &self.device)
            .finish()
    }
}
