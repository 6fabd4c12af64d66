// trustlayer-core/src/upstream.rs
//! Clients for the AI provider that receives sanitized prompts.
//!
//! License: MIT OR APACHE 2.0

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{RetryPolicy, UpstreamConfig};
use crate::errors::UpstreamError;

/// Number of prompt characters echoed back by [`MockProvider`].
const MOCK_ECHO_CHARS: usize = 50;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Sends an already sanitized prompt and returns the reply text.
    async fn complete(&self, prompt: &str) -> Result<String, UpstreamError>;
}

/// Offline provider used when the API key is a `sk-mock` key.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockProvider;

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, prompt: &str) -> Result<String, UpstreamError> {
        let head: String = prompt.chars().take(MOCK_ECHO_CHARS).collect();
        Ok(format!(
            "Denied/Processed: This is a mocked response. Your safe input was: {}...",
            head
        ))
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiProvider {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("trustlayer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            retry: config.retry.clone(),
        })
    }

    async fn attempt(&self, prompt: &str) -> Result<String, UpstreamError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status.as_u16(), text));
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| UpstreamError::Decode(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| UpstreamError::Decode("response has no choices[0].message.content".to_string()))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &str) -> Result<String, UpstreamError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt(prompt).await {
                Ok(reply) => {
                    debug!("Upstream replied on attempt {}.", attempt);
                    return Ok(reply);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.backoff_delay(attempt);
                    warn!(
                        "Upstream attempt {}/{} failed ({}); retrying in {:?}.",
                        attempt, max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Mock provider for `sk-mock` keys, the real client otherwise.
pub fn provider_from_config(config: &UpstreamConfig) -> Result<Arc<dyn LlmProvider>, UpstreamError> {
    if config.is_mock() {
        info!("Mock API key configured; upstream calls are answered locally.");
        Ok(Arc::new(MockProvider))
    } else {
        Ok(Arc::new(OpenAiProvider::new(config)?))
    }
}
