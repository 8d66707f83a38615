//! Ollama HTTP client.

use super::models::{check_status, fetch_models, sort_models};
use super::{GenerateRequest, GenerateResponse, ModelClient, ModelError};
use crate::utils::url::construct_api_url;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, model))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, model: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            model: model.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Same endpoint and HTTP client, different model.
    pub fn with_model(&self, model: &str) -> Self {
        Self::with_client(self.client.clone(), &self.base_url, model)
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn for_model(&self, model: &str) -> Arc<dyn ModelClient> {
        Arc::new(self.with_model(model))
    }

    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let url = construct_api_url(&self.base_url, "api/generate");
        debug!(model = %self.model, prompt_chars = prompt.len(), "Sending generate request");
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        let response = self.client.post(url).json(&request).send().await?;
        let response = check_status(response).await?;
        let body = response
            .json::<GenerateResponse>()
            .await
            .map_err(|err| ModelError::Decode(err.to_string()))?;
        Ok(body.response.trim().to_string())
    }

    async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        let mut models = fetch_models(&self.client, &self.base_url).await?;
        sort_models(&mut models);
        Ok(models.into_iter().map(|model| model.name).collect())
    }

    async fn test_connection(&self) -> Result<String, ModelError> {
        let models = fetch_models(&self.client, &self.base_url).await?;
        Ok(format!(
            "Connected to {} ({} models available)",
            self.base_url,
            models.len()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_request_disables_streaming() {
        let request = GenerateRequest {
            model: "llama2",
            prompt: "hi",
            stream: false,
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"model": "llama2", "prompt": "hi", "stream": false})
        );
    }

    #[test]
    fn switching_model_keeps_endpoint() {
        let client = OllamaClient::with_client(reqwest::Client::new(), "http://gpu:11434/", "llama2");
        let other = client.with_model("mistral");
        assert_eq!(other.model(), "mistral");
        assert_eq!(other.base_url(), "http://gpu:11434/");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let client = OllamaClient::new("http://127.0.0.1:9", "llama2", Duration::from_secs(2))
            .expect("client builds");
        let err = client.generate("hello").await.expect_err("nothing listens on port 9");
        assert!(matches!(err, ModelError::Transport(_)));
    }
}
