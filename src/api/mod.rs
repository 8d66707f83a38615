//! Language-model client surface and the Ollama wire payloads.

pub mod models;
pub mod ollama;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

pub use ollama::OllamaClient;

#[derive(Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
}

#[derive(Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub response: String,
}

#[derive(Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub modified_at: Option<String>,
    pub size: Option<u64>,
}

#[derive(Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

#[derive(Debug)]
pub enum ModelError {
    /// The request never produced an HTTP response.
    Transport(reqwest::Error),
    /// The server answered with a non-success status.
    Status { status: u16, message: String },
    /// The response body was not what the API promises.
    Decode(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Transport(err) => write!(f, "Model request failed: {err}"),
            ModelError::Status { status, message } => {
                write!(f, "Model API error ({status}): {message}")
            }
            ModelError::Decode(message) => write!(f, "Unexpected model response: {message}"),
        }
    }
}

impl StdError for ModelError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ModelError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        ModelError::Transport(err)
    }
}

/// A text-completion model. Calls are network-fallible and never retried.
#[async_trait]
pub trait ModelClient: Send + Sync {
    fn model(&self) -> &str;

    /// A client for the same endpoint talking to a different model.
    fn for_model(&self, model: &str) -> Arc<dyn ModelClient>;

    /// Complete `prompt` and return the full response text.
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;

    async fn list_models(&self) -> Result<Vec<String>, ModelError>;

    /// Check the endpoint is reachable and return a short status line.
    async fn test_connection(&self) -> Result<String, ModelError>;
}
