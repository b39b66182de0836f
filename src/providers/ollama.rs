//! Ollama API client
//!
//! Implements text generation (`POST /api/chat`) and embeddings
//! (`POST /api/embed`) against a local Ollama server. Transient failures
//! are retried with exponential backoff.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::errors::{RagError, Result};
use crate::providers::{Embedder, RetryManager, TextGenerator};
use crate::types::{ChatMessage, FinishReason, Generation, GenerationParams, TokenUsage};

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default chat model
pub const DEFAULT_CHAT_MODEL: &str = "qwen2.5:7b-instruct";

/// Default embedding model
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";

/// Embedding dimension of the default embedding model
pub const DEFAULT_EMBED_DIM: usize = 768;

/// Default request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Ollama HTTP client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    chat_model: String,
    embed_model: String,
    embed_dim: usize,
    retry: RetryManager,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaClient {
    /// Create new Ollama client with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_OLLAMA_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBED_MODEL)
    }

    /// Create Ollama client with custom configuration
    pub fn with_config(base_url: &str, chat_model: &str, embed_model: &str) -> Result<Self> {
        Self::with_timeout(base_url, chat_model, embed_model, REQUEST_TIMEOUT)
    }

    /// Create Ollama client with a custom request timeout
    pub fn with_timeout(
        base_url: &str,
        chat_model: &str,
        embed_model: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RagError::HttpError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_model: chat_model.to_string(),
            embed_model: embed_model.to_string(),
            embed_dim: DEFAULT_EMBED_DIM,
            retry: RetryManager::new(),
        })
    }

    /// Override the embedding dimension reported by `dimension()`
    pub fn with_embed_dimension(mut self, dimension: usize) -> Self {
        self.embed_dim = dimension;
        self
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/version", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn chat_once(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<Generation> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model: &self.chat_model,
            messages,
            stream: false,
            options: ChatOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
                top_p: params.top_p,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Generation(format!("failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::Generation(format!("HTTP {}: {}", status, error_text)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| RagError::Generation(format!("invalid chat response: {}", e)))?;

        Ok(Generation {
            text: body.message.content,
            finish_reason: FinishReason::from_provider(body.done_reason.as_deref()),
            usage: TokenUsage {
                prompt_tokens: body.prompt_eval_count,
                completion_tokens: body.eval_count,
            },
        })
    }

    async fn embed_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);
        let request = EmbedRequest {
            model: &self.embed_model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::Embedding(format!("HTTP {}: {}", status, error_text)));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("invalid embed response: {}", e)))?;

        if body.embeddings.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.embeddings.len()
            )));
        }

        Ok(body.embeddings)
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<Generation> {
        debug!(model = %self.chat_model, messages = messages.len(), "ollama chat request");
        self.retry
            .execute_with_retry(|| self.chat_once(messages, params))
            .await
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(RagError::Embedding("empty embedding batch".to_string()));
        }
        debug!(model = %self.embed_model, batch = texts.len(), "ollama embed request");
        self.retry
            .execute_with_retry(|| self.embed_once(texts))
            .await
    }

    fn dimension(&self) -> usize {
        self.embed_dim
    }
}
