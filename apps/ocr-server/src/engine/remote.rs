//! Remote Engine
//!
//! Backend that drives an inference sidecar over HTTP. The sidecar hosts the
//! model process (hub download, weights, device placement) and shares the
//! upload/output directories with this server through the filesystem.
//!
//! Sidecar API:
//! - POST /v1/tokenizers                 `{model}` -> `{id}`
//! - POST /v1/models                     `{model, attn_implementation}` -> `{id}`
//! - POST /v1/models/{id}/placement      `{device, dtype}`
//! - POST /v1/models/{id}/infer          `{tokenizer, prompt, image_file, ...}` -> `{text}`

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::backend::{EngineBackend, OcrModel, Tokenizer};
use super::types::{AttentionImpl, EngineError, InferCall};
use crate::config::{Device, Precision};

/// Inference sidecar backend
pub struct RemoteEngine {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteEngine {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct CreatedResource {
    id: String,
}

#[derive(Deserialize)]
struct InferResponse {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct InferRequest<'a> {
    tokenizer: &'a str,
    #[serde(flatten)]
    call: &'a InferCall,
}

/// POST a JSON body and decode the JSON reply, folding every failure into a message
async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
) -> Result<T, String> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| format!("Failed to call inference engine: {}", e))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(format!("Inference engine returned {}: {}", status, body));
    }

    response
        .json()
        .await
        .map_err(|e| format!("Failed to parse engine response: {}", e))
}

#[async_trait]
impl EngineBackend for RemoteEngine {
    async fn load_tokenizer(&self, model_id: &str) -> Result<Arc<dyn Tokenizer>, EngineError> {
        let url = format!("{}/v1/tokenizers", self.base_url);
        let created: CreatedResource = post_json(
            &self.client,
            &url,
            &serde_json::json!({ "model": model_id, "trust_remote_code": true }),
        )
        .await
        .map_err(EngineError::Tokenizer)?;

        Ok(Arc::new(RemoteTokenizer { id: created.id }))
    }

    async fn load_model(
        &self,
        model_id: &str,
        attention: AttentionImpl,
    ) -> Result<Box<dyn OcrModel>, EngineError> {
        let url = format!("{}/v1/models", self.base_url);
        let created: CreatedResource = post_json(
            &self.client,
            &url,
            &serde_json::json!({
                "model": model_id,
                "attn_implementation": attention,
                "trust_remote_code": true,
                "use_safetensors": true,
            }),
        )
        .await
        .map_err(EngineError::ModelLoad)?;

        Ok(Box::new(RemoteModel {
            client: self.client.clone(),
            model_url: format!("{}/v1/models/{}", self.base_url, created.id),
        }))
    }
}

struct RemoteTokenizer {
    id: String,
}

impl Tokenizer for RemoteTokenizer {
    fn id(&self) -> &str {
        &self.id
    }
}

struct RemoteModel {
    client: reqwest::Client,
    model_url: String,
}

#[async_trait]
impl OcrModel for RemoteModel {
    async fn place(&mut self, device: Device, precision: Precision) -> Result<(), EngineError> {
        let url = format!("{}/placement", self.model_url);
        post_json::<_, serde_json::Value>(
            &self.client,
            &url,
            &serde_json::json!({ "device": device, "dtype": precision }),
        )
        .await
        .map(|_| ())
        .map_err(|reason| EngineError::Placement {
            device: device.to_string(),
            reason,
        })
    }

    async fn infer(&self, tokenizer: &dyn Tokenizer, call: &InferCall) -> Result<String, EngineError> {
        let url = format!("{}/infer", self.model_url);
        let request = InferRequest {
            tokenizer: tokenizer.id(),
            call,
        };
        let response: InferResponse = post_json(&self.client, &url, &request)
            .await
            .map_err(EngineError::Inference)?;

        Ok(response.text)
    }
}
