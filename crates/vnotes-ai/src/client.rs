//! Chat-completion HTTP client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::config::ChatConfig;
use crate::error::{AiError, AiResult};
use crate::types::{ChatMessage, ChatRequest, ChatResponse, ErrorEnvelope};

/// Anything that can turn a prompt into a completion.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> AiResult<String>;
}

/// Client for an OpenAI-compatible chat-completion API.
#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    config: ChatConfig,
}

impl ChatClient {
    pub fn new(config: ChatConfig) -> AiResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AiError::Transport(e.to_string()))?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> AiResult<Self> {
        Self::new(ChatConfig::from_env())
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    fn decode_error(status: StatusCode, body: &str) -> AiError {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => AiError::remote(status.as_u16(), describe(envelope.error)),
            Err(_) => AiError::remote(status.as_u16(), body.to_string()),
        }
    }
}

fn describe(error: crate::types::ErrorBody) -> String {
    match error.kind {
        Some(kind) => format!("{} ({})", error.message, kind),
        None => error.message,
    }
}

#[async_trait]
impl Completion for ChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> AiResult<String> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            AiError::ServiceUnavailable("OPENROUTER_API_KEY is not configured".to_string())
        })?;

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            stream: false,
        };

        debug!(model = %self.config.model, messages = messages.len(), "Sending chat completion");

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.config.app_url)
            .header("X-Title", &self.config.app_title)
            .json(&request)
            .send()
            .await
            .map_err(|e| AiError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AiError::Transport(e.to_string()))?;

        if status != StatusCode::OK {
            warn!(status = %status, "Chat completion rejected");
            return Err(Self::decode_error(status, &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| AiError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = parsed.error {
            return Err(AiError::remote(status.as_u16(), describe(error)));
        }

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(AiError::EmptyResponse)
    }
}
