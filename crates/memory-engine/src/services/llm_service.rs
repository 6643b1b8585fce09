use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use crate::models::chat::ChatMessage;
use crate::services::memory::providers::TextGenerator;
use crate::utils::error::MemoryError;
use crate::utils::retry::{retry_with_backoff, AttemptError, RetryPolicy};

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub max_tokens: usize,
    pub temperature: f32,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// OpenAI-compatible chat completion client (`POST {base_url}/chat/completions`).
pub struct LlmService {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl LlmService {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            retry: RetryPolicy::with_timeout(timeout),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn attempt(
        &self,
        messages: &[ChatMessage],
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String, AttemptError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            max_tokens,
            temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(AttemptError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::from_status(status, body));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::Permanent(e.into()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AttemptError::Permanent(anyhow::anyhow!("No completion returned")))
    }
}

#[async_trait]
impl TextGenerator for LlmService {
    async fn generate_with(
        &self,
        messages: &[ChatMessage],
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String, MemoryError> {
        debug!("Requesting completion for {} messages", messages.len());

        retry_with_backoff(&self.retry, "chat completion", || {
            self.attempt(messages, max_tokens, temperature)
        })
        .await
        .map_err(|e| MemoryError::BackendUnavailable(format!("text generation: {:#}", e)))
    }
}
