//! Mock engine backend for tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::backend::{EngineBackend, OcrModel, Tokenizer};
use super::types::{AttentionImpl, EngineError, InferCall};
use crate::config::{Device, Precision};

/// Scriptable backend that counts every call it receives
#[derive(Default)]
pub struct MockBackend {
    pub tokenizer_calls: AtomicUsize,
    pub model_calls: AtomicUsize,
    pub infer_calls: Arc<AtomicUsize>,
    pub last_call: Arc<Mutex<Option<InferCall>>>,
    load_delay: Duration,
    infer_delay: Duration,
    tokenizer_error: Option<String>,
    flash_error: Option<String>,
    eager_error: Option<String>,
    output: String,
    result_file: Option<String>,
    infer_error: Option<String>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            output: "engine output".to_string(),
            ..Default::default()
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_infer_delay(mut self, delay: Duration) -> Self {
        self.infer_delay = delay;
        self
    }

    pub fn failing_tokenizer(mut self, error: &str) -> Self {
        self.tokenizer_error = Some(error.to_string());
        self
    }

    pub fn without_flash_attention(mut self) -> Self {
        self.flash_error = Some("flash_attn is not installed".to_string());
        self
    }

    pub fn failing_eager(mut self, error: &str) -> Self {
        self.eager_error = Some(error.to_string());
        self
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.output = output.to_string();
        self
    }

    pub fn writing_result_file(mut self, contents: &str) -> Self {
        self.result_file = Some(contents.to_string());
        self
    }

    pub fn failing_inference(mut self, error: &str) -> Self {
        self.infer_error = Some(error.to_string());
        self
    }

    pub fn tokenizer_calls(&self) -> usize {
        self.tokenizer_calls.load(Ordering::SeqCst)
    }
}

struct MockTokenizer;

impl Tokenizer for MockTokenizer {
    fn id(&self) -> &str {
        "mock-tokenizer"
    }
}

struct MockModel {
    output: String,
    infer_delay: Duration,
    result_file: Option<String>,
    infer_error: Option<String>,
    infer_calls: Arc<AtomicUsize>,
    last_call: Arc<Mutex<Option<InferCall>>>,
}

#[async_trait]
impl EngineBackend for MockBackend {
    async fn load_tokenizer(&self, _model_id: &str) -> Result<Arc<dyn Tokenizer>, EngineError> {
        self.tokenizer_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.load_delay).await;
        match &self.tokenizer_error {
            Some(error) => Err(EngineError::Tokenizer(error.clone())),
            None => Ok(Arc::new(MockTokenizer)),
        }
    }

    async fn load_model(
        &self,
        _model_id: &str,
        attention: AttentionImpl,
    ) -> Result<Box<dyn OcrModel>, EngineError> {
        self.model_calls.fetch_add(1, Ordering::SeqCst);
        let error = match attention {
            AttentionImpl::FlashAttention2 => &self.flash_error,
            AttentionImpl::Eager => &self.eager_error,
        };
        if let Some(error) = error {
            return Err(EngineError::ModelLoad(error.clone()));
        }
        Ok(Box::new(MockModel {
            output: self.output.clone(),
            infer_delay: self.infer_delay,
            result_file: self.result_file.clone(),
            infer_error: self.infer_error.clone(),
            infer_calls: self.infer_calls.clone(),
            last_call: self.last_call.clone(),
        }))
    }
}

#[async_trait]
impl OcrModel for MockModel {
    async fn place(&mut self, _device: Device, _precision: Precision) -> Result<(), EngineError> {
        Ok(())
    }

    async fn infer(&self, _tokenizer: &dyn Tokenizer, call: &InferCall) -> Result<String, EngineError> {
        self.infer_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_call.lock() = Some(call.clone());
        tokio::time::sleep(self.infer_delay).await;

        if let Some(error) = &self.infer_error {
            return Err(EngineError::Inference(error.clone()));
        }
        if let Some(contents) = &self.result_file {
            std::fs::write(call.output_path.join("result.mmd"), contents)
                .map_err(|e| EngineError::Inference(e.to_string()))?;
        }
        Ok(self.output.clone())
    }
}
