//! OpenAI-compatible `/chat/completions` synthesis provider.

use crate::http::Endpoint;
use async_trait::async_trait;
use log::debug;
use mnemos_memory::synthesis::render_fragments;
use mnemos_memory::{ProviderError, SynthesisProvider};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CHAT_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Consolidates fragments with a chat model (OpenRouter, LM Studio, OpenAI).
#[derive(Debug, Clone)]
pub struct ChatSynthesizer {
    endpoint: Endpoint,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl ChatSynthesizer {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint::new(base_url, Duration::from_secs(120)),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.endpoint.set_api_key(Some(api_key.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint.set_timeout(timeout);
        self
    }

    /// Sampling temperature, clamped to `[0.0, 2.0]`.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// `X-Title` header, used by OpenRouter for attribution.
    pub fn with_app_title(mut self, title: impl Into<String>) -> Self {
        self.endpoint.push_header("X-Title", title);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl SynthesisProvider for ChatSynthesizer {
    async fn synthesize(
        &self,
        instruction: &str,
        texts: &[String],
    ) -> Result<String, ProviderError> {
        debug!(
            "requesting synthesis (model={}, fragments={})",
            self.model,
            texts.len()
        );
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage::new("system", instruction.to_string()),
                ChatMessage::new("user", render_fragments(texts)),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let response: ChatResponse = self
            .endpoint
            .post_json("chat/completions", &request)
            .await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("chat response had no content".to_string())
            })
    }

    fn name(&self) -> String {
        format!("openai/{}", self.model)
    }
}
