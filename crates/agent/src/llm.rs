//! Model collaborator boundary.
//!
//! The model is a black box: given a system prompt, the transcript so far, and
//! the tools on offer, it returns ordered text deltas and zero or more tool calls.

use std::time::Duration;

use async_trait::async_trait;
use bondline_core::config::LlmConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TranscriptEntry {
    User { content: String },
    Assistant { content: String, tool_calls: Vec<ToolCall> },
    ToolResult { call_id: String, content: String, is_error: bool },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub transcript: Vec<TranscriptEntry>,
    pub tools: Vec<ToolSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub deltas: Vec<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl ModelTurn {
    pub fn text(&self) -> String {
        self.deltas.concat()
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model endpoint is not configured (set llm.base_url)")]
    NotConfigured,
    #[error("model request failed: {0}")]
    Transport(String),
    #[error("model endpoint returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("model response could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn next_turn(&self, request: &ModelRequest) -> Result<ModelTurn, ModelError>;
}

/// JSON-over-HTTP adapter: one POST per turn to `llm.base_url`.
#[derive(Clone, Debug)]
pub struct HttpModelClient {
    client: Client,
    base_url: Option<String>,
    model: String,
    api_key: Option<SecretString>,
}

#[derive(Serialize)]
struct TurnPayload<'a> {
    model: &'a str,
    #[serde(flatten)]
    request: &'a ModelRequest,
}

impl HttpModelClient {
    pub fn new(config: &LlmConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| ModelError::Transport(error.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn next_turn(&self, request: &ModelRequest) -> Result<ModelTurn, ModelError> {
        let Some(base_url) = self.base_url.as_deref() else {
            return Err(ModelError::NotConfigured);
        };

        let mut builder = self
            .client
            .post(base_url)
            .json(&TurnPayload { model: &self.model, request });
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response =
            builder.send().await.map_err(|error| ModelError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Status { status: status.as_u16(), message });
        }

        response.json::<ModelTurn>().await.map_err(|error| ModelError::Decode(error.to_string()))
    }
}
