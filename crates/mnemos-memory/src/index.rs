//! Vector index manager: records, similarity structure and their artifacts.

use crate::embedder::{EmbedderInfo, EmbeddingProvider};
use crate::error::{MemoryError, ProviderError};
use crate::flat::FlatIndex;
use crate::model::{AddOutcome, BatchItem, MemoryArea, MemoryRecord, SearchHit, content_hash};
use crate::policy::IndexOptions;
use crate::storage::{IndexArtifacts, IndexMetadata};
use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Snapshot of index size and health.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IndexStats {
    pub total_records: usize,
    pub total_vectors: usize,
    pub dimension: usize,
    /// Record count per area name.
    pub areas: BTreeMap<String, usize>,
    pub embedder: EmbedderInfo,
    /// In-memory changes not yet written to disk.
    pub dirty: bool,
}

#[derive(Debug)]
struct IndexState {
    records: Vec<MemoryRecord>,
    /// First record position per content hash.
    by_hash: HashMap<String, usize>,
    by_id: HashMap<Uuid, usize>,
    vectors: FlatIndex,
    next_slot: usize,
    dirty: bool,
}

impl IndexState {
    fn empty(dimension: usize) -> Self {
        Self {
            records: Vec::new(),
            by_hash: HashMap::new(),
            by_id: HashMap::new(),
            vectors: FlatIndex::new(dimension),
            next_slot: 0,
            dirty: false,
        }
    }

    fn from_records(records: Vec<MemoryRecord>, vectors: FlatIndex) -> Self {
        let mut state = Self {
            records: Vec::with_capacity(records.len()),
            by_hash: HashMap::new(),
            by_id: HashMap::new(),
            vectors,
            next_slot: 0,
            dirty: false,
        };
        for record in records {
            state.index_record(record);
        }
        state.next_slot = state.records.len();
        state
    }

    fn index_record(&mut self, record: MemoryRecord) {
        let position = self.records.len();
        self.by_hash
            .entry(record.content_hash.clone())
            .or_insert(position);
        self.by_id.insert(record.id, position);
        self.records.push(record);
    }

    fn append(&mut self, record: MemoryRecord, vector: &[f32]) {
        self.vectors.push(vector);
        self.index_record(record);
        self.next_slot = self.records.len();
        self.dirty = true;
    }

    fn duplicate_of(&self, hash: &str) -> Option<Uuid> {
        self.by_hash
            .get(hash)
            .and_then(|position| self.records.get(*position))
            .map(|record| record.id)
    }
}

/// Authoritative record list plus a slot-aligned flat inner-product index.
///
/// All state sits behind one mutex that is never held across an await;
/// embedding calls happen with it released and writers re-check for
/// duplicates once they take it back.
pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    artifacts: IndexArtifacts,
    options: IndexOptions,
    state: Mutex<IndexState>,
}

impl VectorIndex {
    /// Open (or create) the index stored under `dir`.
    ///
    /// Missing metadata yields an empty index. Unreadable metadata is logged
    /// and the index starts empty without touching the file. A vector file
    /// that does not line up with the records triggers [`VectorIndex::rebuild`].
    pub async fn open(
        dir: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingProvider>,
        options: IndexOptions,
    ) -> Result<Self, MemoryError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let artifacts = IndexArtifacts::new(&dir);
        let dimension = embedder.dimension();

        let metadata = match artifacts.read_metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(
                    "index metadata unreadable, starting empty (dir={}, error={})",
                    dir.display(),
                    err
                );
                None
            }
        };

        let Some(IndexMetadata {
            next_slot, records, ..
        }) = metadata
        else {
            info!("opened empty memory index (dir={})", dir.display());
            return Ok(Self {
                embedder,
                artifacts,
                options,
                state: Mutex::new(IndexState::empty(dimension)),
            });
        };

        let (vectors, problem) = match artifacts.read_vectors() {
            Ok(Some(vectors)) => {
                let problem = consistency_problem(&records, next_slot, &vectors, dimension);
                (vectors, problem)
            }
            Ok(None) if records.is_empty() => (FlatIndex::new(dimension), None),
            Ok(None) => (
                FlatIndex::new(dimension),
                Some("vector file missing".to_string()),
            ),
            Err(err) => (FlatIndex::new(dimension), Some(err.to_string())),
        };
        let vectors = if problem.is_some() {
            FlatIndex::new(dimension)
        } else {
            vectors
        };

        let index = Self {
            embedder,
            artifacts,
            options,
            state: Mutex::new(IndexState::from_records(records, vectors)),
        };

        if let Some(problem) = problem {
            warn!(
                "corrupt index state, rebuilding (dir={}, reason={})",
                dir.display(),
                problem
            );
            index.rebuild().await?;
        }

        info!(
            "opened memory index (dir={}, records={})",
            dir.display(),
            index.len()
        );
        Ok(index)
    }

    /// Directory holding this index's artifacts.
    pub fn dir(&self) -> &Path {
        self.artifacts.dir()
    }

    /// Insert one text unless an identical text is already stored.
    pub async fn add(
        &self,
        text: impl Into<String>,
        area: impl Into<MemoryArea>,
        metadata: Value,
        force: bool,
    ) -> Result<AddOutcome, MemoryError> {
        let text = text.into();
        let area = area.into();
        if text.trim().is_empty() {
            return Err(MemoryError::EmptyText);
        }
        let hash = content_hash(&text);
        if !force {
            let existing = self.state.lock().duplicate_of(&hash);
            if let Some(existing) = existing {
                debug!("duplicate memory skipped (id={existing})");
                return Ok(AddOutcome::Duplicate(existing));
            }
        }

        let vector = self
            .embed_checked(std::slice::from_ref(&text))
            .await?
            .pop()
            .ok_or(ProviderError::CountMismatch {
                expected: 1,
                actual: 0,
            })?;

        let mut state = self.state.lock();
        if !force && let Some(existing) = state.duplicate_of(&hash) {
            debug!("duplicate memory skipped after embedding (id={existing})");
            return Ok(AddOutcome::Duplicate(existing));
        }

        let id = Uuid::new_v4();
        let record = MemoryRecord {
            id,
            text,
            area,
            metadata: object_or_empty(metadata),
            created_at: Utc::now(),
            content_hash: hash,
            vector_slot: state.vectors.len(),
        };
        let area_name = record.area.clone();
        state.append(record, &vector);
        info!(
            "memory added (area={}, id={}, total={})",
            area_name,
            id,
            state.records.len()
        );
        self.persist_locked(&mut state, Some(id))?;
        Ok(AddOutcome::Inserted(id))
    }

    /// Insert many texts with one embedding call; returns ids of new records
    /// in input order. Duplicates, both against the index and within the
    /// batch, are skipped.
    pub async fn add_batch(&self, items: Vec<BatchItem>) -> Result<Vec<Uuid>, MemoryError> {
        if items.iter().any(|item| item.text.trim().is_empty()) {
            return Err(MemoryError::EmptyText);
        }

        let pending: Vec<(BatchItem, String)> = {
            let state = self.state.lock();
            let mut seen = HashSet::new();
            items
                .into_iter()
                .filter_map(|item| {
                    let hash = content_hash(&item.text);
                    if state.by_hash.contains_key(&hash) || !seen.insert(hash.clone()) {
                        None
                    } else {
                        Some((item, hash))
                    }
                })
                .collect()
        };
        if pending.is_empty() {
            debug!("batch insert skipped, every item already stored");
            return Ok(Vec::new());
        }

        let texts: Vec<String> = pending.iter().map(|(item, _)| item.text.clone()).collect();
        let vectors = self.embed_checked(&texts).await?;

        let mut state = self.state.lock();
        let now = Utc::now();
        let mut ids = Vec::with_capacity(pending.len());
        for ((item, hash), vector) in pending.into_iter().zip(vectors) {
            if state.by_hash.contains_key(&hash) {
                continue;
            }
            let id = Uuid::new_v4();
            let record = MemoryRecord {
                id,
                text: item.text,
                area: item.area,
                metadata: object_or_empty(item.metadata),
                created_at: now,
                content_hash: hash,
                vector_slot: state.vectors.len(),
            };
            state.append(record, &vector);
            ids.push(id);
        }
        if ids.is_empty() {
            return Ok(ids);
        }
        info!(
            "memory batch added (inserted={}, total={})",
            ids.len(),
            state.records.len()
        );
        self.persist_locked(&mut state, None)?;
        Ok(ids)
    }

    /// Rank records by similarity to `query`.
    ///
    /// Over-fetches twice `top_k` candidates and widens the window while the
    /// area filter or score floor leaves fewer than `top_k` hits.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        area_filter: Option<&MemoryArea>,
        min_score: f32,
    ) -> Result<Vec<SearchHit>, MemoryError> {
        if top_k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self
            .embed_checked(&[query.to_string()])
            .await?
            .pop()
            .ok_or(ProviderError::CountMismatch {
                expected: 1,
                actual: 0,
            })?;

        let state = self.state.lock();
        let total = state.records.len();
        let mut window = top_k.saturating_mul(2).max(top_k).min(total);
        loop {
            let candidates = state.vectors.search(&query_vector, window);
            let below_floor = candidates
                .last()
                .is_some_and(|(_, score)| *score < min_score);
            let hits: Vec<SearchHit> = candidates
                .into_iter()
                .filter(|(_, score)| *score >= min_score)
                .filter_map(|(slot, score)| {
                    let record = state.records.get(slot)?;
                    if area_filter.is_some_and(|area| *area != record.area) {
                        return None;
                    }
                    Some((record, score))
                })
                .take(top_k)
                .enumerate()
                .map(|(position, (record, score))| SearchHit {
                    id: record.id,
                    text: record.text.clone(),
                    area: record.area.clone(),
                    metadata: record.metadata.clone(),
                    created_at: record.created_at,
                    score,
                    rank: position + 1,
                })
                .collect();

            if hits.len() >= top_k || window >= total || below_floor {
                debug!(
                    "memory search (top_k={}, window={}, hits={})",
                    top_k,
                    window,
                    hits.len()
                );
                return Ok(hits);
            }
            window = window.saturating_mul(2).min(total);
        }
    }

    /// Records in `area`, in insertion order.
    pub fn list_area(&self, area: &MemoryArea) -> Vec<MemoryRecord> {
        self.state
            .lock()
            .records
            .iter()
            .filter(|record| record.area == *area)
            .cloned()
            .collect()
    }

    pub fn count_area(&self, area: &MemoryArea) -> usize {
        self.state
            .lock()
            .records
            .iter()
            .filter(|record| record.area == *area)
            .count()
    }

    pub fn get(&self, id: Uuid) -> Option<MemoryRecord> {
        let state = self.state.lock();
        state
            .by_id
            .get(&id)
            .and_then(|position| state.records.get(*position))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record count per area name.
    pub fn area_counts(&self) -> BTreeMap<String, usize> {
        let state = self.state.lock();
        let mut counts = BTreeMap::new();
        for record in &state.records {
            *counts.entry(record.area.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Move a record to another area, noting where it came from.
    pub fn retag(&self, id: Uuid, area: impl Into<MemoryArea>) -> Result<(), MemoryError> {
        let area = area.into();
        let mut state = self.state.lock();
        let position = *state.by_id.get(&id).ok_or(MemoryError::UnknownRecord(id))?;
        let record = &mut state.records[position];
        if record.area == area {
            return Ok(());
        }
        let previous = std::mem::replace(&mut record.area, area);
        if let Value::Object(map) = &mut record.metadata {
            map.insert("retagged_from".to_string(), json!(previous.as_str()));
            map.insert("retagged_at".to_string(), json!(Utc::now().to_rfc3339()));
        }
        info!(
            "memory retagged (id={}, from={}, to={})",
            id, previous, record.area
        );
        state.dirty = true;
        self.persist_locked(&mut state, Some(id))
    }

    /// Re-embed every record and replace the similarity structure.
    ///
    /// Slots are reassigned to `0..n` in record order and all artifacts are
    /// rewritten. Running it twice gives the same result.
    pub async fn rebuild(&self) -> Result<(), MemoryError> {
        let mut vectors: Vec<Vec<f32>> = Vec::new();
        loop {
            let pending: Vec<String> = {
                let state = self.state.lock();
                state.records[vectors.len().min(state.records.len())..]
                    .iter()
                    .map(|record| record.text.clone())
                    .collect()
            };
            if !pending.is_empty() {
                vectors.extend(self.embed_checked(&pending).await?);
            }

            let mut state = self.state.lock();
            if state.records.len() > vectors.len() {
                // Records were appended while embedding; pick them up next round.
                continue;
            }
            let mut flat = FlatIndex::new(self.embedder.dimension());
            for vector in &vectors {
                flat.push(vector);
            }
            for (slot, record) in state.records.iter_mut().enumerate() {
                record.vector_slot = slot;
            }
            state.vectors = flat;
            state.next_slot = state.records.len();
            state.dirty = true;
            info!(
                "memory index rebuilt (dir={}, records={})",
                self.artifacts.dir().display(),
                state.records.len()
            );
            return self.persist_locked(&mut state, None);
        }
    }

    /// Write the current state to disk. Safe to call repeatedly.
    pub fn persist(&self) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        self.persist_locked(&mut state, None)
    }

    pub fn stats(&self) -> IndexStats {
        let areas = self.area_counts();
        let state = self.state.lock();
        IndexStats {
            total_records: state.records.len(),
            total_vectors: state.vectors.len(),
            dimension: state.vectors.dimension(),
            areas,
            embedder: self.embedder.info(),
            dirty: state.dirty,
        }
    }

    fn persist_locked(
        &self,
        state: &mut IndexState,
        record_id: Option<Uuid>,
    ) -> Result<(), MemoryError> {
        match self.artifacts.write(
            &state.records,
            state.next_slot,
            &state.vectors,
            &self.embedder.info(),
        ) {
            Ok(()) => {
                state.dirty = false;
                Ok(())
            }
            Err(err) => {
                warn!(
                    "failed to persist memory index (dir={}, error={})",
                    self.artifacts.dir().display(),
                    err
                );
                Err(MemoryError::persistence(record_id, err))
            }
        }
    }

    async fn embed_checked(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let timeout = self.options.embed_timeout;
        let vectors = tokio::time::timeout(timeout, self.embedder.embed(texts))
            .await
            .map_err(|_| ProviderError::Timeout(timeout))??;
        if vectors.len() != texts.len() {
            return Err(ProviderError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        let expected = self.embedder.dimension();
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != expected) {
            return Err(ProviderError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }
}

fn object_or_empty(metadata: Value) -> Value {
    match metadata {
        Value::Object(_) => metadata,
        Value::Null => Value::Object(Map::new()),
        other => json!({ "value": other }),
    }
}

/// Describe why stored vectors cannot be used as-is, if they cannot.
fn consistency_problem(
    records: &[MemoryRecord],
    next_slot: usize,
    vectors: &FlatIndex,
    dimension: usize,
) -> Option<String> {
    if vectors.dimension() != dimension {
        return Some(format!(
            "vector dimension {} does not match embedder dimension {}",
            vectors.dimension(),
            dimension
        ));
    }
    if vectors.len() != records.len() {
        return Some(format!(
            "{} vectors for {} records",
            vectors.len(),
            records.len()
        ));
    }
    if next_slot != records.len() {
        return Some(format!(
            "next_slot {} does not match {} records",
            next_slot,
            records.len()
        ));
    }
    records
        .iter()
        .enumerate()
        .find(|(position, record)| record.vector_slot != *position)
        .map(|(position, record)| {
            format!(
                "record {} at position {} claims slot {}",
                record.id, position, record.vector_slot
            )
        })
}
