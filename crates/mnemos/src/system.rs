//! Config-driven entry point tying providers, policies and the registry together.

use crate::error::MnemosError;
use crate::runtime::{
    embedder_from_config, mind_options_from_config, resolve_memory_root,
    retrieve_options_from_config, synthesizer_from_config,
};
use log::info;
use mnemos_config::{LayeredConfigOptions, MnemosConfig};
use mnemos_memory::{
    EmbeddingProvider, MemoryMind, MemoryRegistry, RetrieveOptions, SynthesisProvider,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A configured memory host: one registry over one storage root.
pub struct MemorySystem {
    config: MnemosConfig,
    registry: MemoryRegistry,
}

impl MemorySystem {
    /// Start building a system from `config`.
    pub fn builder(config: MnemosConfig) -> MemorySystemBuilder {
        MemorySystemBuilder::new(config)
    }

    /// Build a system with providers and root taken from `config`.
    pub fn from_config(config: MnemosConfig) -> Result<Self, MnemosError> {
        Self::builder(config).build()
    }

    /// Load the layered config for `cwd` and build from it.
    pub fn load(cwd: impl AsRef<Path>) -> Result<Self, MnemosError> {
        Self::load_with_options(LayeredConfigOptions::new(cwd))
    }

    /// Load a layered config with explicit layer locations and build from it.
    pub fn load_with_options(options: LayeredConfigOptions) -> Result<Self, MnemosError> {
        let cwd = options.cwd.clone();
        let layered = MnemosConfig::load_layered_with_options(options)?;
        Self::builder(layered.config).cwd(cwd).build()
    }

    pub fn config(&self) -> &MnemosConfig {
        &self.config
    }

    pub fn registry(&self) -> &MemoryRegistry {
        &self.registry
    }

    pub fn root(&self) -> &Path {
        self.registry.root()
    }

    /// Open (or reuse) the mind for `namespace`.
    pub async fn open(&self, namespace: &str) -> Result<Arc<MemoryMind>, MnemosError> {
        Ok(self.registry.open(namespace).await?)
    }

    /// Open the namespace named by `memory.namespace`.
    pub async fn open_default(&self) -> Result<Arc<MemoryMind>, MnemosError> {
        self.open(&self.config.memory.namespace).await
    }

    /// Retrieve options seeded from `memory.recall_k` and `memory.min_score`.
    pub fn retrieve_options(&self) -> RetrieveOptions {
        retrieve_options_from_config(&self.config.memory)
    }

    /// Stop every scheduler and flush every open namespace.
    pub async fn shutdown(&self) {
        info!("shutting down memory system (root={})", self.root().display());
        self.registry.shutdown().await;
    }
}

/// Builder for [`MemorySystem`] with optional provider and path overrides.
pub struct MemorySystemBuilder {
    config: MnemosConfig,
    cwd: Option<PathBuf>,
    root: Option<PathBuf>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    synthesizer: Option<Arc<dyn SynthesisProvider>>,
}

impl MemorySystemBuilder {
    pub fn new(config: MnemosConfig) -> Self {
        Self {
            config,
            cwd: None,
            root: None,
            embedder: None,
            synthesizer: None,
        }
    }

    /// Directory that relative `memory.root` values resolve against.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Storage root, overriding `memory.root`.
    pub fn root(mut self, root: impl AsRef<Path>) -> Self {
        self.root = Some(root.as_ref().to_path_buf());
        self
    }

    /// Use this embedder instead of the configured one.
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Use this synthesizer instead of the configured one.
    pub fn synthesizer(mut self, synthesizer: Arc<dyn SynthesisProvider>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn build(self) -> Result<MemorySystem, MnemosError> {
        self.config.validate()?;
        let root = match self.root {
            Some(root) => root,
            None => {
                let cwd = match self.cwd {
                    Some(cwd) => cwd,
                    None => std::env::current_dir()?,
                };
                resolve_memory_root(&self.config.memory, &cwd)
            }
        };
        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => embedder_from_config(&self.config.embedder)?,
        };
        let synthesizer = match self.synthesizer {
            Some(synthesizer) => synthesizer,
            None => synthesizer_from_config(&self.config.synthesis)?,
        };
        let options = mind_options_from_config(&self.config);
        info!(
            "memory system ready (root={}, embedder={}, synthesizer={})",
            root.display(),
            embedder.info().model,
            synthesizer.name()
        );
        Ok(MemorySystem {
            registry: MemoryRegistry::new(root, embedder, synthesizer, options),
            config: self.config,
        })
    }
}
