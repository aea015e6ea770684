use async_trait::async_trait;
use mnemos_memory::{EmbedderInfo, EmbeddingProvider, HashingEmbedder, ProviderError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Deterministic embedder that records every batch it is asked to embed.
#[derive(Debug, Clone)]
pub struct StubEmbedder {
    inner: HashingEmbedder,
    delay: Option<Duration>,
    pub batches: Arc<Mutex<Vec<Vec<String>>>>,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: HashingEmbedder::new(dimension).with_model("stub"),
            delay: None,
            batches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep before answering, to widen race windows in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of embed calls seen so far.
    pub fn calls(&self) -> usize {
        self.batches.lock().len()
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.batches.lock().push(texts.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.embed(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn info(&self) -> EmbedderInfo {
        EmbedderInfo {
            provider: "stub".to_string(),
            ..self.inner.info()
        }
    }
}

/// Embedder whose every call fails.
#[derive(Debug, Clone)]
pub struct FailingEmbedder {
    message: String,
    dimension: usize,
}

impl FailingEmbedder {
    pub fn new(message: impl Into<String>, dimension: usize) -> Self {
        Self {
            message: message.into(),
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::Request(self.message.clone()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn info(&self) -> EmbedderInfo {
        EmbedderInfo {
            provider: "failing".to_string(),
            model: "failing".to_string(),
            dimension: self.dimension,
            normalize: true,
        }
    }
}
