//! Tunables for the index, retrieval, context formatting and consolidation.

use crate::model::MemoryArea;
use crate::synthesis::DEFAULT_CONSOLIDATION_INSTRUCTION;
use std::time::Duration;

/// Options for a [`crate::VectorIndex`].
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Upper bound on a single embedding call.
    pub embed_timeout: Duration,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            embed_timeout: Duration::from_secs(30),
        }
    }
}

/// Options for a retrieve call.
#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    pub top_k: usize,
    /// Only return records from this area.
    pub area: Option<MemoryArea>,
    /// Drop hits scoring below this similarity.
    pub min_score: f32,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            area: None,
            min_score: 0.3,
        }
    }
}

impl RetrieveOptions {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_area(mut self, area: impl Into<MemoryArea>) -> Self {
        self.area = Some(area.into());
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }
}

/// How conversation context is assembled from memories.
#[derive(Debug, Clone)]
pub struct ContextPolicy {
    /// Most recent turns folded into the query.
    pub history_window: usize,
    /// Hits below this score are left out of the context block.
    pub relevance_floor: f32,
    /// Default number of memories in a context block.
    pub max_items: usize,
    /// Characters of each memory shown before truncation.
    pub excerpt_chars: usize,
}

impl Default for ContextPolicy {
    fn default() -> Self {
        Self {
            history_window: 3,
            relevance_floor: 0.4,
            max_items: 5,
            excerpt_chars: 200,
        }
    }
}

/// When and how fragments are consolidated.
#[derive(Debug, Clone)]
pub struct ConsolidationPolicy {
    /// Fragment count at which automatic triggers become eligible.
    pub threshold: usize,
    /// Fewer fragments than this and a run does nothing.
    pub min_batch: usize,
    /// Newest fragments consumed per run.
    pub max_fragments: usize,
    /// Minimum gap between attempts started by `store`.
    pub store_cooldown: Duration,
    /// Minimum gap between attempts started by the scheduler.
    pub background_cooldown: Duration,
    /// Scheduler tick period.
    pub interval: Duration,
    /// How long `stop_background` waits for the scheduler task.
    pub shutdown_timeout: Duration,
    /// Upper bound on a single synthesis call.
    pub synthesis_timeout: Duration,
    /// Start the scheduler when the mind is opened through the registry.
    pub background: bool,
    pub instruction: String,
}

impl Default for ConsolidationPolicy {
    fn default() -> Self {
        Self {
            threshold: 10,
            min_batch: 3,
            max_fragments: 20,
            store_cooldown: Duration::from_secs(600),
            background_cooldown: Duration::from_secs(1800),
            interval: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(5),
            synthesis_timeout: Duration::from_secs(120),
            background: true,
            instruction: DEFAULT_CONSOLIDATION_INSTRUCTION.to_string(),
        }
    }
}
