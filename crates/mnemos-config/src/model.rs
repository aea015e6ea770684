//! Configuration schema for Mnemos.

use serde::{Deserialize, Serialize};

/// Root config for a Mnemos memory host.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MnemosConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub embedder: EmbedderConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
    #[serde(default)]
    pub context: ContextConfig,
}

impl MnemosConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> MnemosConfigBuilder {
        MnemosConfigBuilder::new()
    }
}

/// Builder for assembling a `MnemosConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct MnemosConfigBuilder {
    config: MnemosConfig,
}

impl MnemosConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: MnemosConfig::default(),
        }
    }

    /// Replace the memory storage configuration.
    pub fn memory(mut self, memory: MemoryConfig) -> Self {
        self.config.memory = memory;
        self
    }

    /// Replace the embedding provider configuration.
    pub fn embedder(mut self, embedder: EmbedderConfig) -> Self {
        self.config.embedder = embedder;
        self
    }

    /// Replace the synthesis provider configuration.
    pub fn synthesis(mut self, synthesis: SynthesisConfig) -> Self {
        self.config.synthesis = synthesis;
        self
    }

    /// Replace the consolidation scheduling configuration.
    pub fn consolidation(mut self, consolidation: ConsolidationConfig) -> Self {
        self.config.consolidation = consolidation;
        self
    }

    /// Replace the context formatting configuration.
    pub fn context(mut self, context: ContextConfig) -> Self {
        self.config.context = context;
        self
    }

    /// Finalize and return the built `MnemosConfig`.
    pub fn build(self) -> MnemosConfig {
        self.config
    }
}

/// Storage location and recall defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Root directory holding one sub-directory per namespace.
    #[serde(default)]
    pub root: Option<String>,
    /// Namespace opened by default (usually the agent name).
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_recall_k")]
    pub recall_k: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            root: None,
            namespace: default_namespace(),
            recall_k: default_recall_k(),
            min_score: default_min_score(),
        }
    }
}

/// Default namespace name.
fn default_namespace() -> String {
    "daemon".to_string()
}

/// Default number of memories returned by a retrieve call.
fn default_recall_k() -> usize {
    10
}

/// Default similarity floor for retrieve calls.
fn default_min_score() -> f32 {
    0.3
}

/// Embedding provider kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderProviderKind {
    /// Built-in deterministic feature-hashing embedder.
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai,
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    #[serde(default)]
    pub provider: EmbedderProviderKind,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_embedder_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
    /// Entries kept by the content-hash embedding cache; 0 disables it.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            provider: EmbedderProviderKind::default(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            base_url: None,
            api_key_env: default_embedder_api_key_env(),
            timeout_secs: default_embed_timeout_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_embedding_model() -> String {
    "mnemos-hashing-v1".to_string()
}

fn default_embedding_dimension() -> usize {
    384
}

fn default_embedder_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_embed_timeout_secs() -> u64 {
    30
}

fn default_cache_capacity() -> usize {
    4096
}

/// Synthesis provider kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisProviderKind {
    /// No synthesis provider; consolidation attempts fail cleanly.
    #[default]
    None,
    /// OpenAI-compatible `/chat/completions` endpoint (OpenRouter, LM Studio, ...).
    Openai,
}

/// Synthesis provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default)]
    pub provider: SynthesisProviderKind,
    #[serde(default = "default_synthesis_model")]
    pub model: String,
    #[serde(default = "default_synthesis_base_url")]
    pub base_url: String,
    #[serde(default = "default_synthesis_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_synthesis_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Replaces the built-in consolidation instruction when set.
    #[serde(default)]
    pub instruction: Option<String>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            provider: SynthesisProviderKind::default(),
            model: default_synthesis_model(),
            base_url: default_synthesis_base_url(),
            api_key_env: default_synthesis_api_key_env(),
            timeout_secs: default_synthesis_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: None,
            instruction: None,
        }
    }
}

fn default_synthesis_model() -> String {
    "anthropic/claude-3-haiku".to_string()
}

fn default_synthesis_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_synthesis_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_synthesis_timeout_secs() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.7
}

/// Consolidation trigger and scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Fragment count at which automatic consolidation becomes eligible.
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    /// Minimum fragments a consolidation run needs to do anything.
    #[serde(default = "default_min_batch")]
    pub min_batch: usize,
    /// Newest fragments consumed per run.
    #[serde(default = "default_max_fragments")]
    pub max_fragments: usize,
    #[serde(default = "default_store_cooldown_secs")]
    pub store_cooldown_secs: u64,
    #[serde(default = "default_background_cooldown_secs")]
    pub background_cooldown_secs: u64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    #[serde(default = "default_background_enabled")]
    pub background: bool,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            min_batch: default_min_batch(),
            max_fragments: default_max_fragments(),
            store_cooldown_secs: default_store_cooldown_secs(),
            background_cooldown_secs: default_background_cooldown_secs(),
            interval_secs: default_interval_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            background: default_background_enabled(),
        }
    }
}

fn default_threshold() -> usize {
    10
}

fn default_min_batch() -> usize {
    3
}

fn default_max_fragments() -> usize {
    20
}

/// Ten minutes between store-triggered runs.
fn default_store_cooldown_secs() -> u64 {
    600
}

/// Thirty minutes between scheduler-triggered runs.
fn default_background_cooldown_secs() -> u64 {
    1800
}

/// Scheduler wakes every five minutes.
fn default_interval_secs() -> u64 {
    300
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

fn default_background_enabled() -> bool {
    true
}

/// Conversation context formatting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Recent conversation turns folded into the retrieval query.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_relevance_floor")]
    pub relevance_floor: f32,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            relevance_floor: default_relevance_floor(),
            max_items: default_max_items(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

fn default_history_window() -> usize {
    3
}

fn default_relevance_floor() -> f32 {
    0.4
}

fn default_max_items() -> usize {
    5
}

fn default_excerpt_chars() -> usize {
    200
}
