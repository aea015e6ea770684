//! Config to runtime mapping.

use crate::error::MnemosError;
use directories::BaseDirs;
use log::{debug, info, warn};
use mnemos_config::{
    ConsolidationConfig, ContextConfig, EmbedderConfig, EmbedderProviderKind, MemoryConfig,
    MnemosConfig, SynthesisConfig, SynthesisProviderKind,
};
use mnemos_memory::{
    CachedEmbedder, ConsolidationPolicy, ContextPolicy, DisabledSynthesizer, EmbeddingProvider,
    HashingEmbedder, IndexOptions, MemoryMindOptions, RetrieveOptions, SynthesisProvider,
};
use mnemos_providers::{
    ChatSynthesizer, DEFAULT_CHAT_BASE_URL, DEFAULT_EMBEDDINGS_BASE_URL, OpenAiEmbedder,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Title sent to OpenRouter-style endpoints.
const APP_TITLE: &str = "Mnemos";

/// Build the embedding provider described by `config`, wrapped in the
/// content-hash cache when `cache_capacity` is non-zero.
pub fn embedder_from_config(
    config: &EmbedderConfig,
) -> Result<Arc<dyn EmbeddingProvider>, MnemosError> {
    info!(
        "initializing embedder (provider={:?}, model={}, dimension={})",
        config.provider, config.model, config.dimension
    );
    let embedder: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbedderProviderKind::Hashing => {
            Arc::new(HashingEmbedder::new(config.dimension).with_model(config.model.clone()))
        }
        EmbedderProviderKind::Openai => {
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_EMBEDDINGS_BASE_URL.to_string());
            let mut embedder =
                OpenAiEmbedder::new(base_url.as_str(), config.model.clone(), config.dimension)
                    .with_timeout(Duration::from_secs(config.timeout_secs));
            match api_key(&config.api_key_env) {
                Some(key) => embedder = embedder.with_api_key(key),
                None if base_url == DEFAULT_EMBEDDINGS_BASE_URL => {
                    return Err(MnemosError::MissingApiKey {
                        provider: "embedder".to_string(),
                        env: config.api_key_env.clone(),
                    });
                }
                None => debug!("embedder endpoint used without api key (base_url={base_url})"),
            }
            Arc::new(embedder)
        }
    };

    if config.cache_capacity == 0 {
        return Ok(embedder);
    }
    Ok(Arc::new(CachedEmbedder::new(embedder, config.cache_capacity)))
}

/// Build the synthesis provider described by `config`.
pub fn synthesizer_from_config(
    config: &SynthesisConfig,
) -> Result<Arc<dyn SynthesisProvider>, MnemosError> {
    match config.provider {
        SynthesisProviderKind::None => {
            warn!("no synthesis provider configured, consolidation will not produce summaries");
            Ok(Arc::new(DisabledSynthesizer))
        }
        SynthesisProviderKind::Openai => {
            info!(
                "initializing synthesizer (model={}, base_url={})",
                config.model, config.base_url
            );
            let mut synthesizer =
                ChatSynthesizer::new(config.base_url.as_str(), config.model.clone())
                    .with_timeout(Duration::from_secs(config.timeout_secs))
                    .with_temperature(config.temperature)
                    .with_max_tokens(config.max_tokens)
                    .with_app_title(APP_TITLE);
            match api_key(&config.api_key_env) {
                Some(key) => synthesizer = synthesizer.with_api_key(key),
                None if config.base_url.trim_end_matches('/') == DEFAULT_CHAT_BASE_URL => {
                    return Err(MnemosError::MissingApiKey {
                        provider: "synthesis".to_string(),
                        env: config.api_key_env.clone(),
                    });
                }
                None => debug!(
                    "synthesis endpoint used without api key (base_url={})",
                    config.base_url
                ),
            }
            Ok(Arc::new(synthesizer))
        }
    }
}

/// Translate the consolidation section into the runtime policy.
pub fn consolidation_policy_from_config(
    consolidation: &ConsolidationConfig,
    synthesis: &SynthesisConfig,
) -> ConsolidationPolicy {
    let defaults = ConsolidationPolicy::default();
    ConsolidationPolicy {
        threshold: consolidation.threshold,
        min_batch: consolidation.min_batch,
        max_fragments: consolidation.max_fragments,
        store_cooldown: Duration::from_secs(consolidation.store_cooldown_secs),
        background_cooldown: Duration::from_secs(consolidation.background_cooldown_secs),
        interval: Duration::from_secs(consolidation.interval_secs),
        shutdown_timeout: Duration::from_secs(consolidation.shutdown_timeout_secs),
        synthesis_timeout: Duration::from_secs(synthesis.timeout_secs),
        background: consolidation.background,
        instruction: synthesis
            .instruction
            .clone()
            .filter(|instruction| !instruction.trim().is_empty())
            .unwrap_or(defaults.instruction),
    }
}

/// Translate the context section into the runtime policy.
pub fn context_policy_from_config(config: &ContextConfig) -> ContextPolicy {
    ContextPolicy {
        history_window: config.history_window,
        relevance_floor: config.relevance_floor,
        max_items: config.max_items,
        excerpt_chars: config.excerpt_chars,
    }
}

/// Everything a [`mnemos_memory::MemoryMind`] needs from the config.
pub fn mind_options_from_config(config: &MnemosConfig) -> MemoryMindOptions {
    MemoryMindOptions {
        index: IndexOptions {
            embed_timeout: Duration::from_secs(config.embedder.timeout_secs),
        },
        consolidation: consolidation_policy_from_config(&config.consolidation, &config.synthesis),
        context: context_policy_from_config(&config.context),
    }
}

/// Default retrieve options from the memory section.
pub fn retrieve_options_from_config(config: &MemoryConfig) -> RetrieveOptions {
    RetrieveOptions::default()
        .with_top_k(config.recall_k)
        .with_min_score(config.min_score)
}

/// Resolve the storage root: absolute paths as-is, relative paths against
/// `cwd`, otherwise `~/.mnemos/memory`.
pub fn resolve_memory_root(config: &MemoryConfig, cwd: &Path) -> PathBuf {
    if let Some(root) = &config.root {
        let root = PathBuf::from(root);
        if root.is_absolute() {
            debug!("using absolute memory root: {}", root.display());
            return root;
        }
        debug!(
            "resolving memory root relative to cwd: {}",
            cwd.join(&root).display()
        );
        return cwd.join(root);
    }
    if let Some(home) = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()) {
        return home.join(".mnemos").join("memory");
    }
    cwd.join(".mnemos").join("memory")
}

fn api_key(env: &str) -> Option<String> {
    std::env::var(env).ok().filter(|key| !key.trim().is_empty())
}
