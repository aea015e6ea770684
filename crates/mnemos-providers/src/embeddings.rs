//! OpenAI-compatible `/embeddings` provider.

use crate::http::Endpoint;
use async_trait::async_trait;
use log::debug;
use mnemos_memory::{EmbedderInfo, EmbeddingProvider, ProviderError, l2_normalize};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_EMBEDDINGS_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Embeds text through an OpenAI-compatible HTTP endpoint.
///
/// Returned vectors are re-normalized locally, so inner product equals
/// cosine similarity regardless of what the server does.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    endpoint: Endpoint,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            endpoint: Endpoint::new(base_url, Duration::from_secs(30)),
            model: model.into(),
            dimension,
        }
    }

    /// Bearer token sent with every request; blank keys are ignored.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.endpoint.set_api_key(Some(api_key.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint.set_timeout(timeout);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        self.endpoint.base_url()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            "requesting embeddings (model={}, texts={})",
            self.model,
            texts.len()
        );
        let response: EmbeddingResponse = self
            .endpoint
            .post_json(
                "embeddings",
                &EmbeddingRequest {
                    model: &self.model,
                    input: texts,
                },
            )
            .await?;

        if response.data.len() != texts.len() {
            return Err(ProviderError::CountMismatch {
                expected: texts.len(),
                actual: response.data.len(),
            });
        }
        let mut data = response.data;
        data.sort_by_key(|item| item.index);
        data.into_iter()
            .map(|item| {
                let mut vector = item.embedding;
                if vector.len() != self.dimension {
                    return Err(ProviderError::DimensionMismatch {
                        expected: self.dimension,
                        actual: vector.len(),
                    });
                }
                l2_normalize(&mut vector);
                Ok(vector)
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn info(&self) -> EmbedderInfo {
        EmbedderInfo {
            provider: "openai".to_string(),
            model: self.model.clone(),
            dimension: self.dimension,
            normalize: true,
        }
    }
}
