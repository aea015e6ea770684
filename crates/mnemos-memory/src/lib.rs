//! Semantic memory index and consolidation scheduler for Mnemos.

pub mod consolidation;
pub mod context;
pub mod embedder;
pub mod error;
mod flat;
pub mod index;
pub mod mind;
pub mod model;
pub mod policy;
pub mod registry;
pub mod storage;
pub mod synthesis;

/// Consolidation gate, permits and outcomes.
pub use consolidation::{
    ConsolidationCoordinator, ConsolidationOutcome, ConsolidationPermit, ConsolidationState,
    ConsolidationTrigger,
};
/// Embedding provider interface and built-in embedders.
pub use embedder::{CachedEmbedder, EmbedderInfo, EmbeddingProvider, HashingEmbedder, l2_normalize};
/// Memory error types.
pub use error::{MemoryError, ProviderError, StorageError};
/// Vector index manager.
pub use index::{IndexStats, VectorIndex};
/// Memory orchestrator.
pub use mind::{MemoryMind, MemoryMindOptions, MemoryStats};
/// Record model.
pub use model::{AddOutcome, BatchItem, MemoryArea, MemoryRecord, SearchHit, content_hash};
/// Index, retrieval, context and consolidation tunables.
pub use policy::{ConsolidationPolicy, ContextPolicy, IndexOptions, RetrieveOptions};
/// Namespace registry.
pub use registry::MemoryRegistry;
/// Synthesis provider interface.
pub use synthesis::{DEFAULT_CONSOLIDATION_INSTRUCTION, DisabledSynthesizer, SynthesisProvider};
