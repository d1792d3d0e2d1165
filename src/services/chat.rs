// Remote chat-model client used by the filter and translation agents.
//
// Talks the Anthropic messages protocol; the trait seam lets tests swap in
// a scripted model with no network.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::core::config::LlmConfig;
use crate::core::errors::AgentError;

/// One round-trip with the chat model: a system prompt plus a single user
/// message in, raw completion text out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AgentError>;
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

/// Production `ChatModel` backed by the Anthropic messages endpoint, with
/// retry on transport and 5xx/429 failures.
pub struct AnthropicChat {
    client: reqwest::Client,
    config: LlmConfig,
}

impl AnthropicChat {
    pub fn new(config: LlmConfig) -> Result<Self, AgentError> {
        if config.api_key.is_none() {
            return Err(AgentError::MissingApiKey);
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    async fn request_once(&self, system: &str, user: &str) -> Result<String, AgentError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(AgentError::MissingApiKey)?;

        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "system": system,
            "messages": [{ "role": "user", "content": user }],
        });

        let response = self
            .client
            .post(&self.config.api_base)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AgentError::MalformedResponse(e.to_string()))?;

        parsed
            .content
            .first()
            .map(|block| block.text.clone())
            .ok_or_else(|| AgentError::MalformedResponse("empty content array".to_string()))
    }

    fn retryable(error: &AgentError) -> bool {
        match error {
            AgentError::Transport(_) => true,
            AgentError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[async_trait]
impl ChatModel for AnthropicChat {
    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn complete(&self, system: &str, user: &str) -> Result<String, AgentError> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff with jitter to avoid thundering herd
                let base = 2u64.saturating_pow(attempt - 1) * 500;
                let jitter = rand::thread_rng().gen_range(0..250u64);
                let delay = Duration::from_millis(base + jitter);
                debug!(attempt, ?delay, "retrying chat request");
                tokio::time::sleep(delay).await;
            }

            match self.request_once(system, user).await {
                Ok(text) => return Ok(text),
                Err(e) if Self::retryable(&e) => {
                    warn!(attempt, error = %e, "chat request failed, will retry");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| AgentError::MalformedResponse("retry loop exhausted".to_string())))
    }
}
