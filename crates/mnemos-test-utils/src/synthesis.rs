use async_trait::async_trait;
use mnemos_memory::{ProviderError, SynthesisProvider};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FixedSynthesizer {
    response: String,
}

impl FixedSynthesizer {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl SynthesisProvider for FixedSynthesizer {
    async fn synthesize(
        &self,
        _instruction: &str,
        _texts: &[String],
    ) -> Result<String, ProviderError> {
        Ok(self.response.clone())
    }

    fn name(&self) -> String {
        "fixed".to_string()
    }
}

/// One request seen by a [`RecordingSynthesizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisCall {
    pub instruction: String,
    pub texts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RecordingSynthesizer {
    response: String,
    calls: Arc<Mutex<Vec<SynthesisCall>>>,
}

impl RecordingSynthesizer {
    pub fn new(response: impl Into<String>) -> (Self, Arc<Mutex<Vec<SynthesisCall>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                response: response.into(),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl SynthesisProvider for RecordingSynthesizer {
    async fn synthesize(
        &self,
        instruction: &str,
        texts: &[String],
    ) -> Result<String, ProviderError> {
        self.calls.lock().push(SynthesisCall {
            instruction: instruction.to_string(),
            texts: texts.to_vec(),
        });
        Ok(self.response.clone())
    }

    fn name(&self) -> String {
        "recording".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct FailingSynthesizer {
    message: String,
}

impl FailingSynthesizer {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl SynthesisProvider for FailingSynthesizer {
    async fn synthesize(
        &self,
        _instruction: &str,
        _texts: &[String],
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Request(self.message.clone()))
    }

    fn name(&self) -> String {
        "failing".to_string()
    }
}

/// Sleeps before answering and counts how many calls started.
#[derive(Debug, Clone)]
pub struct SlowSynthesizer {
    response: String,
    delay: Duration,
    pub started: Arc<AtomicUsize>,
}

impl SlowSynthesizer {
    pub fn new(response: impl Into<String>, delay: Duration) -> Self {
        Self {
            response: response.into(),
            delay,
            started: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisProvider for SlowSynthesizer {
    async fn synthesize(
        &self,
        _instruction: &str,
        texts: &[String],
    ) -> Result<String, ProviderError> {
        let call = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        Ok(format!("{} (run {call}, {} fragments)", self.response, texts.len()))
    }

    fn name(&self) -> String {
        "slow".to_string()
    }
}
