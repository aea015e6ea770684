//! Error types for memory operations.

use std::time::Duration;
use uuid::Uuid;

/// Errors returned by embedding and synthesis providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Transport-level failure talking to the provider.
    #[error("provider request failed: {0}")]
    Request(String),
    /// Provider answered with a non-success status.
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// Provider call exceeded its time budget.
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
    /// Provider answered with something we could not use.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    /// Vector length differs from the index dimension.
    #[error("embedding dimension mismatch (expected={expected}, actual={actual})")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Provider returned a different number of results than inputs.
    #[error("provider returned {actual} results for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
    /// No provider is configured for this operation.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while reading or writing index artifacts.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Artifact content is inconsistent or truncated.
    #[error("corrupt index artifact: {0}")]
    Corrupt(String),
}

/// Errors returned by the index, the orchestrator and the registry.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Embedding or synthesis provider failed; nothing was mutated.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// In-memory state changed but the durable write failed. Retry with `persist()`.
    #[error("failed to persist index (record_id={record_id:?}): {source}")]
    Persistence {
        record_id: Option<Uuid>,
        #[source]
        source: StorageError,
    },
    /// Empty or whitespace-only text.
    #[error("memory text must not be empty")]
    EmptyText,
    /// No record carries this id.
    #[error("unknown memory record: {0}")]
    UnknownRecord(Uuid),
    /// Namespace name cannot be used as a directory.
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    pub(crate) fn persistence(record_id: Option<Uuid>, source: StorageError) -> Self {
        Self::Persistence { record_id, source }
    }
}
