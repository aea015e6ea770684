//! Embedding provider interface plus the built-in hashing and caching embedders.

use crate::error::ProviderError;
use crate::model::content_hash;
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Identity of an embedding model, written next to the index for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedderInfo {
    /// Provider kind (`hashing`, `openai`, `stub`, ...).
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    /// Whether returned vectors are L2-normalized.
    pub normalize: bool,
}

#[async_trait]
/// Turns text into fixed-dimension, L2-normalized vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed every input, returning one vector per input in the same order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    fn info(&self) -> EmbedderInfo;
}

#[async_trait]
impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for Arc<T> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        (**self).embed(texts).await
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn info(&self) -> EmbedderInfo {
        (**self).info()
    }
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Model name reported by [`HashingEmbedder`] unless overridden.
pub const HASHING_MODEL: &str = "mnemos-hashing-v1";

/// Deterministic feature-hashing embedder.
///
/// Lowercased alphanumeric word unigrams and bigrams are hashed with FNV-1a
/// into signed buckets, then the vector is L2-normalized. Texts that share
/// words land close together, which is enough for local recall without a
/// model download.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            model: HASHING_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Embed a single text synchronously.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let words = tokenize(text);
        let mut add_feature = |feature: &str| {
            let hash = fnv1a(feature.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        };
        for word in &words {
            add_feature(word);
        }
        for pair in words.windows(2) {
            add_feature(&format!("{} {}", pair[0], pair[1]));
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn info(&self) -> EmbedderInfo {
        EmbedderInfo {
            provider: "hashing".to_string(),
            model: self.model.clone(),
            dimension: self.dimension,
            normalize: true,
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, Vec<f32>>,
    order: VecDeque<String>,
}

/// Content-hash keyed cache in front of another provider.
///
/// Holds at most `capacity` vectors and evicts the oldest entry first.
pub struct CachedEmbedder<E> {
    inner: E,
    capacity: usize,
    state: Mutex<CacheState>,
}

impl<E: EmbeddingProvider> CachedEmbedder<E> {
    pub fn new(inner: E, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Number of cached vectors.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached vector.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
    }

    fn insert(&self, key: String, vector: Vec<f32>) {
        let mut state = self.state.lock();
        if state.entries.contains_key(&key) {
            return;
        }
        while state.entries.len() >= self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
        }
        state.order.push_back(key.clone());
        state.entries.insert(key, vector);
    }
}

#[async_trait]
impl<E: EmbeddingProvider> EmbeddingProvider for CachedEmbedder<E> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let keys: Vec<String> = texts.iter().map(|text| content_hash(text)).collect();
        let mut results: Vec<Option<Vec<f32>>> = {
            let state = self.state.lock();
            keys.iter().map(|key| state.entries.get(key).cloned()).collect()
        };

        let mut miss_keys: Vec<&String> = Vec::new();
        let mut miss_texts = Vec::new();
        for (index, key) in keys.iter().enumerate() {
            if results[index].is_none() && !miss_keys.contains(&key) {
                miss_keys.push(key);
                miss_texts.push(texts[index].clone());
            }
        }

        if !miss_texts.is_empty() {
            debug!(
                "embedding cache miss (requested={}, misses={})",
                texts.len(),
                miss_texts.len()
            );
            let vectors = self.inner.embed(&miss_texts).await?;
            if vectors.len() != miss_texts.len() {
                return Err(ProviderError::CountMismatch {
                    expected: miss_texts.len(),
                    actual: vectors.len(),
                });
            }
            let fresh: HashMap<&String, Vec<f32>> = miss_keys.into_iter().zip(vectors).collect();
            for (index, key) in keys.iter().enumerate() {
                if results[index].is_none() {
                    results[index] = fresh.get(key).cloned();
                }
            }
            for (key, vector) in fresh {
                self.insert(key.clone(), vector);
            }
        }

        results
            .into_iter()
            .map(|vector| {
                vector.ok_or_else(|| {
                    ProviderError::InvalidResponse("embedding missing from cache fill".to_string())
                })
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn info(&self) -> EmbedderInfo {
        self.inner.info()
    }
}

#[cfg(test)]
mod tests {
    use super::{CachedEmbedder, EmbedderInfo, EmbeddingProvider, HashingEmbedder};
    use crate::error::ProviderError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let first = embedder.embed_one("Rust ownership rules");
        let second = embedder.embed_one("rust OWNERSHIP rules!");
        assert_eq!(first, second);
        let norm = dot(&first, &first).sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_words_score_higher_than_unrelated_text() {
        let embedder = HashingEmbedder::new(384);
        let query = embedder.embed_one("borrow checker");
        let related = embedder.embed_one("the borrow checker rejects aliasing");
        let unrelated = embedder.embed_one("tomatoes need sunlight");
        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[test]
    fn punctuation_only_text_embeds_to_zero() {
        let embedder = HashingEmbedder::new(8);
        assert_eq!(embedder.embed_one("?!"), vec![0.0; 8]);
    }

    struct CountingEmbedder {
        calls: Arc<AtomicUsize>,
        inputs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inputs.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|text| vec![text.len() as f32]).collect())
        }

        fn dimension(&self) -> usize {
            1
        }

        fn info(&self) -> EmbedderInfo {
            EmbedderInfo {
                provider: "counting".to_string(),
                model: "counting".to_string(),
                dimension: 1,
                normalize: false,
            }
        }
    }

    #[tokio::test]
    async fn cache_skips_provider_for_known_texts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inputs = Arc::new(AtomicUsize::new(0));
        let cached = CachedEmbedder::new(
            CountingEmbedder {
                calls: calls.clone(),
                inputs: inputs.clone(),
            },
            8,
        );

        let texts = vec!["a".to_string(), "bb".to_string(), "a".to_string()];
        let vectors = cached.embed(&texts).await.expect("embed");
        assert_eq!(vectors, vec![vec![1.0], vec![2.0], vec![1.0]]);
        assert_eq!(inputs.load(Ordering::SeqCst), 2);

        cached.embed(&texts).await.expect("embed again");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.len(), 2);

        cached.clear();
        assert!(cached.is_empty());
    }

    #[tokio::test]
    async fn cache_evicts_oldest_entry() {
        let cached = CachedEmbedder::new(
            CountingEmbedder {
                calls: Arc::new(AtomicUsize::new(0)),
                inputs: Arc::new(AtomicUsize::new(0)),
            },
            2,
        );
        for text in ["a", "bb", "ccc"] {
            cached.embed(&[text.to_string()]).await.expect("embed");
        }
        assert_eq!(cached.len(), 2);
    }
}
