//! Generation and embedding provider seams.
//!
//! Workers and the synthesizer only see the two traits here. Live mode
//! plugs in a Rig `CompletionsClient` for generation and a raw reqwest
//! call for `/embeddings`; tests plug in mocks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::errors::ProviderError;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// One generation call. Timeouts are applied by the caller.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f64>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// System messages joined with newlines.
    pub fn system_text(&self) -> String {
        self.joined(MessageRole::System, "\n")
    }

    /// User messages joined with blank lines.
    pub fn user_text(&self) -> String {
        self.joined(MessageRole::User, "\n\n")
    }

    fn joined(&self, role: MessageRole, sep: &str) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == role)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(sep)
    }
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text into a fixed-dimension vector.
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f64>, ProviderError>;
}

/// The pair of providers a live run needs.
#[derive(Clone)]
pub struct Providers {
    pub generation: Arc<dyn GenerationProvider>,
    pub embedding: Arc<dyn EmbeddingProvider>,
}

impl Providers {
    pub fn new(
        generation: Arc<dyn GenerationProvider>,
        embedding: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            generation,
            embedding,
        }
    }

    /// Build HTTP-backed providers from config.
    pub fn live(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Configuration("missing API key".to_string()))?;
        let generation = RigGenerationProvider::new(api_key, &config.base_url)?;
        let embedding = HttpEmbeddingProvider::new(api_key, &config.base_url, config.timeout())?;
        Ok(Self::new(Arc::new(generation), Arc::new(embedding)))
    }
}

/// Generation over any OpenAI-compatible chat endpoint via Rig.
pub struct RigGenerationProvider {
    client: rig::providers::openai::CompletionsClient,
}

impl RigGenerationProvider {
    pub fn new(api_key: &str, base_url: &str) -> Result<Self, ProviderError> {
        let client = rig::providers::openai::CompletionsClient::builder()
            .api_key(api_key)
            .base_url(base_url)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("failed to build client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl GenerationProvider for RigGenerationProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let preamble = request.system_text();
        let prompt = request.user_text();

        let mut builder = self.client.agent(&request.model).preamble(&preamble);
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }
        let agent = builder.build();

        let content = agent
            .prompt(&prompt)
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if content.trim().is_empty() {
            return Err(ProviderError::Malformed("empty completion".to_string()));
        }
        debug!(model = %request.model, chars = content.len(), "generation complete");
        Ok(content)
    }
}

/// `POST {base_url}/embeddings` with an OpenAI-shaped body.
pub struct HttpEmbeddingProvider {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpEmbeddingProvider {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;
        Ok(Self {
            api_key: api_key.to_string(),
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f64>, ProviderError> {
        let request_body = serde_json::json!({
            "model": model,
            "input": [text],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::status(status.as_u16(), body));
        }

        let resp_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        parse_embedding(&resp_json)
    }
}

/// Extract `data[0].embedding` as a non-empty vector of numbers.
pub fn parse_embedding(resp_json: &serde_json::Value) -> Result<Vec<f64>, ProviderError> {
    let values = resp_json["data"][0]["embedding"]
        .as_array()
        .ok_or_else(|| ProviderError::Malformed("missing data[0].embedding".to_string()))?;

    if values.is_empty() {
        return Err(ProviderError::Malformed("empty embedding".to_string()));
    }

    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64().ok_or_else(|| {
                ProviderError::Malformed(format!("embedding component {i} is not a number"))
            })
        })
        .collect()
}
