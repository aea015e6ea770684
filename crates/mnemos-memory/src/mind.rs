//! Memory orchestrator: provenance, context, consolidation and scheduling.

use crate::consolidation::{
    BackgroundTask, ConsolidationCoordinator, ConsolidationOutcome, ConsolidationPermit,
    ConsolidationState, ConsolidationTrigger,
};
use crate::context::{conversation_query, format_context, format_search_results};
use crate::embedder::EmbeddingProvider;
use crate::error::{MemoryError, ProviderError};
use crate::index::{IndexStats, VectorIndex};
use crate::model::{AddOutcome, MemoryArea, MemoryRecord, SearchHit};
use crate::policy::{ConsolidationPolicy, ContextPolicy, IndexOptions, RetrieveOptions};
use crate::synthesis::SynthesisProvider;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::path::Path;
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Value of the `stored_by` / `consolidated_by` provenance keys.
pub const PROVENANCE_AGENT: &str = "memory_mind";

/// Options used to open a [`MemoryMind`].
#[derive(Debug, Clone, Default)]
pub struct MemoryMindOptions {
    pub index: IndexOptions,
    pub consolidation: ConsolidationPolicy,
    pub context: ContextPolicy,
}

/// Index stats plus consolidation bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub namespace: String,
    #[serde(flatten)]
    pub index: IndexStats,
    pub last_consolidation: Option<DateTime<Utc>>,
    pub consolidation_threshold: usize,
    pub consolidation_runs: u64,
    pub consolidation_state: ConsolidationState,
    pub background_running: bool,
    pub synthesizer: String,
}

/// Per-namespace orchestrator over a [`VectorIndex`].
///
/// The only writer of `solutions` derived from `fragments`. Automatic and
/// manual consolidation share one [`ConsolidationCoordinator`].
pub struct MemoryMind {
    namespace: String,
    index: VectorIndex,
    synthesizer: Arc<dyn SynthesisProvider>,
    consolidation: ConsolidationPolicy,
    context: ContextPolicy,
    coordinator: ConsolidationCoordinator,
    background: Mutex<Option<BackgroundTask>>,
}

impl MemoryMind {
    /// Open the index under `dir` and wrap it.
    pub async fn open(
        namespace: impl Into<String>,
        dir: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingProvider>,
        synthesizer: Arc<dyn SynthesisProvider>,
        options: MemoryMindOptions,
    ) -> Result<Self, MemoryError> {
        let index = VectorIndex::open(dir, embedder, options.index.clone()).await?;
        Ok(Self::new(namespace, index, synthesizer, options))
    }

    pub fn new(
        namespace: impl Into<String>,
        index: VectorIndex,
        synthesizer: Arc<dyn SynthesisProvider>,
        options: MemoryMindOptions,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            index,
            synthesizer,
            consolidation: options.consolidation,
            context: options.context,
            coordinator: ConsolidationCoordinator::new(),
            background: Mutex::new(None),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Underlying index, for listing and maintenance.
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn coordinator(&self) -> &ConsolidationCoordinator {
        &self.coordinator
    }

    /// Store a memory with provenance. Returns `None` when the text was
    /// already stored.
    ///
    /// Storing a fragment also checks the store-triggered consolidation
    /// gate; a failed consolidation there is logged, never returned.
    pub async fn store(
        &self,
        text: impl Into<String>,
        area: impl Into<MemoryArea>,
        metadata: Value,
    ) -> Result<Option<Uuid>, MemoryError> {
        let area = area.into();
        let metadata = with_provenance(metadata);
        let outcome = self.index.add(text, area.clone(), metadata, false).await?;
        match outcome {
            AddOutcome::Inserted(id) => info!(
                "memory stored (namespace={}, area={}, id={})",
                self.namespace, area, id
            ),
            AddOutcome::Duplicate(id) => debug!(
                "memory already stored (namespace={}, id={})",
                self.namespace, id
            ),
        }

        if area == MemoryArea::Fragments
            && let Err(err) = self.maybe_consolidate(ConsolidationTrigger::Store).await
        {
            warn!(
                "store-triggered consolidation failed (namespace={}, error={})",
                self.namespace, err
            );
        }
        Ok(outcome.inserted())
    }

    /// Similarity search over the namespace.
    pub async fn retrieve(
        &self,
        query: &str,
        options: RetrieveOptions,
    ) -> Result<Vec<SearchHit>, MemoryError> {
        self.index
            .search(query, options.top_k, options.area.as_ref(), options.min_score)
            .await
    }

    /// Context block for a conversation turn, or an empty string when no
    /// memory clears the relevance floor.
    pub async fn context_for(
        &self,
        input: &str,
        recent_turns: &[String],
        max_items: usize,
    ) -> Result<String, MemoryError> {
        let query = conversation_query(input, recent_turns, self.context.history_window);
        let hits = self
            .index
            .search(&query, max_items, None, self.context.relevance_floor)
            .await?;
        Ok(format_context(&hits, self.context.excerpt_chars))
    }

    /// Numbered listing of the best matches for display.
    pub async fn search_and_format(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<String, MemoryError> {
        let hits = self
            .retrieve(query, RetrieveOptions::default().with_top_k(max_results))
            .await?;
        Ok(format_search_results(query, &hits))
    }

    /// Records in `area`, in insertion order.
    pub fn list_area(&self, area: &MemoryArea) -> Vec<MemoryRecord> {
        self.index.list_area(area)
    }

    pub fn persist(&self) -> Result<(), MemoryError> {
        self.index.persist()
    }

    /// Consolidate the newest fragments now, ignoring threshold and cooldown.
    pub async fn consolidate(
        &self,
        max_fragments: usize,
    ) -> Result<ConsolidationOutcome, MemoryError> {
        let Some(permit) = self.coordinator.begin_manual() else {
            debug!(
                "manual consolidation skipped, run in flight (namespace={})",
                self.namespace
            );
            return Ok(ConsolidationOutcome::InFlight);
        };
        self.run_consolidation(permit, max_fragments).await
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            namespace: self.namespace.clone(),
            index: self.index.stats(),
            last_consolidation: self.coordinator.last_attempt(),
            consolidation_threshold: self.consolidation.threshold,
            consolidation_runs: self.coordinator.runs(),
            consolidation_state: self.coordinator.state(),
            background_running: self.background_running(),
            synthesizer: self.synthesizer.name(),
        }
    }

    /// Start the periodic consolidation task. Returns false if it is
    /// already running. Must be called inside a tokio runtime.
    pub fn start_background(self: &Arc<Self>) -> bool {
        let mut background = self.background.lock();
        if background.as_ref().is_some_and(BackgroundTask::is_running) {
            return false;
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        *background = Some(BackgroundTask::spawn(
            self.namespace.clone(),
            self.consolidation.interval,
            move || {
                let weak = weak.clone();
                async move {
                    let Some(mind) = weak.upgrade() else {
                        return false;
                    };
                    mind.background_tick().await;
                    true
                }
            },
        ));
        true
    }

    /// Stop the periodic task, waiting up to the configured shutdown timeout.
    pub async fn stop_background(&self) {
        let task = self.background.lock().take();
        if let Some(task) = task {
            task.stop(self.consolidation.shutdown_timeout).await;
        }
    }

    pub fn background_running(&self) -> bool {
        self.background
            .lock()
            .as_ref()
            .is_some_and(BackgroundTask::is_running)
    }

    async fn background_tick(&self) {
        match self.maybe_consolidate(ConsolidationTrigger::Background).await {
            Ok(Some(outcome)) => debug!(
                "background consolidation finished (namespace={}, outcome={:?})",
                self.namespace, outcome
            ),
            Ok(None) => {}
            Err(err) => warn!(
                "background consolidation failed (namespace={}, error={})",
                self.namespace, err
            ),
        }
    }

    /// Run consolidation if the gate admits this trigger.
    async fn maybe_consolidate(
        &self,
        trigger: ConsolidationTrigger,
    ) -> Result<Option<ConsolidationOutcome>, MemoryError> {
        let cooldown = match trigger {
            ConsolidationTrigger::Background => self.consolidation.background_cooldown,
            ConsolidationTrigger::Store | ConsolidationTrigger::Manual => {
                self.consolidation.store_cooldown
            }
        };
        let Some(permit) =
            self.coordinator
                .try_begin(trigger, self.consolidation.threshold, cooldown, || {
                    self.index.count_area(&MemoryArea::Fragments)
                })
        else {
            return Ok(None);
        };
        self.run_consolidation(permit, self.consolidation.max_fragments)
            .await
            .map(Some)
    }

    async fn run_consolidation(
        &self,
        mut permit: ConsolidationPermit,
        max_fragments: usize,
    ) -> Result<ConsolidationOutcome, MemoryError> {
        let mut fragments = self.index.list_area(&MemoryArea::Fragments);
        // The minimum applies to everything stored, before the newest are picked.
        if fragments.len() < self.consolidation.min_batch {
            debug!(
                "not enough fragments to consolidate (namespace={}, fragments={}, min_batch={})",
                self.namespace,
                fragments.len(),
                self.consolidation.min_batch
            );
            return Ok(ConsolidationOutcome::NothingToDo {
                fragments: fragments.len(),
            });
        }
        // Newest first; among equal timestamps the later insert wins.
        fragments.reverse();
        fragments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        fragments.truncate(max_fragments);

        let texts: Vec<String> = fragments.iter().map(|record| record.text.clone()).collect();
        let timeout = self.consolidation.synthesis_timeout;
        let synthesis = tokio::time::timeout(
            timeout,
            self.synthesizer
                .synthesize(&self.consolidation.instruction, &texts),
        )
        .await
        .map_err(|_| ProviderError::Timeout(timeout))??;
        let synthesis = synthesis.trim();
        if synthesis.is_empty() {
            return Err(
                ProviderError::InvalidResponse("synthesis returned no text".to_string()).into(),
            );
        }

        let source_fragments: Vec<String> = fragments
            .iter()
            .map(|record| record.id.to_string())
            .collect();
        let metadata = with_provenance(json!({
            "type": "consolidation",
            "source_fragments": source_fragments,
            "fragment_count": fragments.len(),
            "consolidated_by": PROVENANCE_AGENT,
            "synthesizer": self.synthesizer.name(),
            "trigger": format!("{:?}", permit.trigger()).to_lowercase(),
        }));
        match self
            .index
            .add(synthesis, MemoryArea::Solutions, metadata, false)
            .await?
        {
            AddOutcome::Inserted(solution_id) => {
                permit.mark_consolidated();
                info!(
                    "fragments consolidated (namespace={}, fragments={}, solution_id={})",
                    self.namespace,
                    fragments.len(),
                    solution_id
                );
                Ok(ConsolidationOutcome::Consolidated {
                    solution_id,
                    fragment_count: fragments.len(),
                })
            }
            AddOutcome::Duplicate(existing_id) => {
                Ok(ConsolidationOutcome::Duplicate { existing_id })
            }
        }
    }
}

fn with_provenance(metadata: Value) -> Value {
    let mut map = match metadata {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    map.insert("stored_by".to_string(), json!(PROVENANCE_AGENT));
    map.insert("stored_at".to_string(), json!(Utc::now().to_rfc3339()));
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::{MemoryMind, MemoryMindOptions};
    use crate::embedder::HashingEmbedder;
    use crate::model::MemoryArea;
    use crate::synthesis::DisabledSynthesizer;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn open_mind(dir: &std::path::Path, options: MemoryMindOptions) -> Arc<MemoryMind> {
        let mind = MemoryMind::open(
            "test",
            dir,
            Arc::new(HashingEmbedder::new(128)),
            Arc::new(DisabledSynthesizer),
            options,
        )
        .await
        .expect("mind");
        Arc::new(mind)
    }

    #[tokio::test]
    async fn store_injects_provenance_and_keeps_caller_keys() {
        let temp = tempdir().expect("tempdir");
        let mind = open_mind(temp.path(), MemoryMindOptions::default()).await;
        let id = mind
            .store("user likes tea", "main", json!({ "source": "chat", "stored_by": "x" }))
            .await
            .expect("store")
            .expect("inserted");
        let record = mind.index().get(id).expect("record");
        assert_eq!(record.metadata["source"], json!("chat"));
        assert_eq!(record.metadata["stored_by"], json!("memory_mind"));
        assert!(record.metadata["stored_at"].is_string());

        let again = mind
            .store("user likes tea", "main", json!({}))
            .await
            .expect("store again");
        assert_eq!(again, None);
    }

    #[tokio::test]
    async fn failing_synthesis_does_not_fail_store() {
        let temp = tempdir().expect("tempdir");
        let mut options = MemoryMindOptions::default();
        options.consolidation.threshold = 1;
        options.consolidation.min_batch = 1;
        let mind = open_mind(temp.path(), options).await;
        let id = mind
            .store("a lonely fragment", MemoryArea::Fragments, json!({}))
            .await
            .expect("store");
        assert!(id.is_some());
        assert!(mind.list_area(&MemoryArea::Solutions).is_empty());
        let stats = mind.stats();
        assert!(stats.last_consolidation.is_some());
        assert_eq!(stats.consolidation_runs, 0);
        assert_eq!(stats.synthesizer, "disabled");
    }

    #[tokio::test]
    async fn context_is_empty_below_relevance_floor() {
        let temp = tempdir().expect("tempdir");
        let mind = open_mind(temp.path(), MemoryMindOptions::default()).await;
        mind.store("volcanic soil is fertile", "main", json!({}))
            .await
            .expect("store");
        let context = mind
            .context_for("quantum chromodynamics", &[], 5)
            .await
            .expect("context");
        assert_eq!(context, "");

        let context = mind
            .context_for("volcanic soil is fertile", &[], 5)
            .await
            .expect("context");
        assert!(context.starts_with("## Relevant Memories:\n- [main] volcanic soil is fertile"));
    }

    #[tokio::test]
    async fn background_start_is_idempotent_and_stops() {
        let temp = tempdir().expect("tempdir");
        let mut options = MemoryMindOptions::default();
        options.consolidation.interval = Duration::from_millis(20);
        let mind = open_mind(temp.path(), options).await;
        assert!(mind.start_background());
        assert!(!mind.start_background());
        assert!(mind.stats().background_running);
        mind.stop_background().await;
        assert!(!mind.background_running());
    }
}
