//! Layered configuration loader with requirement constraints.
//!
//! Discovers configuration layers (system/user/project/etc), validates schema,
//! folds in `MNEMOS_*` environment overrides, merges everything under optional
//! requirement constraints, and produces a final `MnemosConfig`.

mod env;
mod layer_io;
mod merge;
mod schema;
mod utils;

#[cfg(test)]
mod tests;

use crate::{ConfigError, MnemosConfig};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Default config filename in local layers.
const DEFAULT_CONFIG_FILE: &str = "mnemos.json5";
/// Default config directory under user or repo roots.
const DEFAULT_CONFIG_DIR: &str = ".mnemos";
/// Marker files/dirs that identify a project root.
const DEFAULT_PROJECT_ROOT_MARKERS: &[&str] = &[".git"];

#[cfg(unix)]
/// Default system config path on Unix.
const SYSTEM_CONFIG_PATH: &str = "/etc/mnemos/mnemos.json5";
#[cfg(unix)]
/// Default requirements path on Unix.
const SYSTEM_REQUIREMENTS_PATH: &str = "/etc/mnemos/requirements.json5";
#[cfg(windows)]
/// Default system config path on Windows.
const SYSTEM_CONFIG_PATH: &str = "C:\\ProgramData\\mnemos\\mnemos.json5";
#[cfg(windows)]
/// Default requirements path on Windows.
const SYSTEM_REQUIREMENTS_PATH: &str = "C:\\ProgramData\\mnemos\\requirements.json5";

/// Effective config plus metadata about which layers were loaded.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    /// The merged, validated config.
    pub config: MnemosConfig,
    /// Metadata for each layer that contributed to the result.
    pub layers: Vec<ConfigLayer>,
}

/// Origin for a single config layer in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// Immutable requirements constraints.
    Requirements,
    /// System-wide configuration.
    System,
    /// User-specific configuration.
    User,
    /// Project root configuration.
    Project,
    /// Current working directory configuration.
    Cwd,
    /// Repo-local configuration.
    Repo,
    /// `MNEMOS_*` environment variables.
    Env,
    /// Runtime overrides (highest precedence).
    Runtime,
}

/// Metadata about a loaded config layer.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    /// Layer origin (system, user, runtime, etc).
    pub source: ConfigLayerSource,
    /// Location on disk, if the layer came from a file.
    pub path: Option<PathBuf>,
}

/// Schema validation mode for layered configs.
#[derive(Debug, Clone, Copy)]
enum SchemaMode {
    /// Partial validation for non-final layers.
    Partial,
    /// Full validation for the effective config.
    Full,
}

/// Options controlling layered config discovery and overrides.
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    /// Working directory used to resolve local layers.
    pub cwd: PathBuf,
    /// Optional system config path (defaults to `/etc/mnemos/mnemos.json5` on Unix).
    pub system_config_path: Option<PathBuf>,
    /// Optional user config path (defaults to `~/.mnemos/mnemos.json5`).
    pub user_config_path: Option<PathBuf>,
    /// Optional requirements/constraints path for locked settings.
    pub requirements_path: Option<PathBuf>,
    /// Runtime override config paths applied last.
    pub runtime_paths: Vec<PathBuf>,
    /// Marker files/dirs used to detect the project root.
    pub project_root_markers: Vec<String>,
    /// Read `MNEMOS_*` environment overrides.
    pub read_env: bool,
}

impl LayeredConfigOptions {
    /// Create options with default layer locations for the provided cwd.
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            system_config_path: layer_io::default_system_config_path(),
            user_config_path: layer_io::default_user_config_path(),
            requirements_path: layer_io::default_requirements_path(),
            runtime_paths: Vec::new(),
            project_root_markers: DEFAULT_PROJECT_ROOT_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
            read_env: true,
        }
    }

    /// Add a runtime override config path that is applied last.
    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Disable environment overrides (mostly useful for tests).
    pub fn without_env(mut self) -> Self {
        self.read_env = false;
        self
    }
}

impl MnemosConfig {
    /// Load a single config from a path (no layering).
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("loading config from path: {}", path.display());
        let contents = fs::read_to_string(path).map_err(|err| ConfigError::read(path, err))?;
        let label = format!("config({})", path.display());
        let value: Value =
            json5::from_str(&contents).map_err(|err| ConfigError::parse(label.as_str(), err))?;
        config_from_value(value, &label)
    }

    /// Load a single config from JSON5 contents (no layering).
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("loading config from raw contents (len={})", contents.len());
        let value: Value =
            json5::from_str(contents).map_err(|err| ConfigError::parse("config", err))?;
        config_from_value(value, "config")
    }

    /// Load a layered config stack using the default layer locations.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        info!(
            "loading layered config with defaults (cwd={})",
            cwd.as_ref().display()
        );
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    /// Load a layered config stack using explicit layer locations and overrides.
    ///
    /// Layer precedence (low -> high): requirements (constraints), system, user,
    /// project, cwd, repo, environment, runtime overrides. Keys present in the
    /// requirements layer cannot be overridden by any later layer.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let cwd = utils::normalize_path(&options.cwd)?;
        debug!("normalized cwd for config load: {}", cwd.display());
        let mut stack = LayerStack::default();

        let requirements = layer_io::load_optional_layer(
            ConfigLayerSource::Requirements,
            options.requirements_path.as_deref(),
        )?;
        let requirements_value = requirements.as_ref().map(|layer| layer.value.clone());
        if let Some(layer) = requirements {
            debug!("loaded requirements layer");
            stack.layers.push(layer.meta);
        }

        for (source, path) in [
            (
                ConfigLayerSource::System,
                options.system_config_path.as_deref(),
            ),
            (ConfigLayerSource::User, options.user_config_path.as_deref()),
        ] {
            if let Some(layer) = layer_io::load_optional_layer(source, path)? {
                debug!("loaded {:?} layer", source);
                stack.push(layer);
            }
        }

        let project_root = utils::find_project_root(&cwd, &options.project_root_markers);
        match project_root.as_ref() {
            Some(root) => debug!("resolved project root: {}", root.display()),
            None => debug!("project root not found; skipping project/repo layers"),
        }

        let mut local_candidates = Vec::new();
        if let Some(root) = project_root.as_ref() {
            local_candidates.push((ConfigLayerSource::Project, root.join(DEFAULT_CONFIG_FILE)));
        }
        local_candidates.push((ConfigLayerSource::Cwd, cwd.join(DEFAULT_CONFIG_FILE)));
        if let Some(root) = project_root.as_ref() {
            local_candidates.push((
                ConfigLayerSource::Repo,
                root.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE),
            ));
        }
        for (source, path) in local_candidates {
            stack.push_local(source, &path)?;
        }

        if options.read_env {
            if let Some(layer) = env::env_layer(std::env::vars())? {
                debug!("loaded environment override layer");
                stack.push(layer);
            }
        }

        for runtime_path in &options.runtime_paths {
            let loaded = layer_io::load_required_layer(ConfigLayerSource::Runtime, runtime_path)?;
            debug!("loaded runtime layer (path={})", runtime_path.display());
            stack.push(loaded);
        }

        let mut merged = Value::Object(serde_json::Map::new());
        if let Some(requirements_value) = &requirements_value {
            merge::merge_json_values(&mut merged, requirements_value);
        }
        for value in &stack.values {
            merge::merge_json_with_constraints(&mut merged, value, requirements_value.as_ref());
        }

        let config = config_from_value(merged, "effective")?;
        info!("layered config loaded (layers={})", stack.layers.len());
        Ok(LayeredConfig {
            config,
            layers: stack.layers,
        })
    }

    /// Validate configuration invariants that cannot be expressed in serde.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "memory.namespace must not be empty".to_string(),
            ));
        }
        if self.embedder.dimension == 0 {
            return Err(ConfigError::Invalid(
                "embedder.dimension must be greater than zero".to_string(),
            ));
        }

        let consolidation = &self.consolidation;
        if consolidation.threshold == 0 || consolidation.min_batch == 0 {
            return Err(ConfigError::Invalid(
                "consolidation.threshold and consolidation.min_batch must be at least 1"
                    .to_string(),
            ));
        }
        if consolidation.max_fragments < consolidation.min_batch {
            return Err(ConfigError::Invalid(format!(
                "consolidation.max_fragments ({}) must be >= consolidation.min_batch ({})",
                consolidation.max_fragments, consolidation.min_batch
            )));
        }
        if consolidation.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "consolidation.interval_secs must be greater than zero".to_string(),
            ));
        }

        for (path, score) in [
            ("memory.min_score", self.memory.min_score),
            ("context.relevance_floor", self.context.relevance_floor),
        ] {
            if !(-1.0..=1.0).contains(&score) {
                return Err(ConfigError::InvalidField {
                    path: path.to_string(),
                    message: "expected a similarity in [-1, 1]".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Internal representation of a loaded config layer.
#[derive(Debug, Clone)]
struct LoadedLayer {
    meta: ConfigLayer,
    value: Value,
}

/// Accumulates mergeable layers in precedence order.
#[derive(Debug, Default)]
struct LayerStack {
    layers: Vec<ConfigLayer>,
    values: Vec<Value>,
    seen_paths: HashSet<PathBuf>,
}

impl LayerStack {
    fn push(&mut self, layer: LoadedLayer) {
        self.layers.push(layer.meta);
        self.values.push(layer.value);
    }

    /// Load a local layer if it exists and has not already been merged under
    /// another name (project and cwd often resolve to the same file).
    fn push_local(&mut self, source: ConfigLayerSource, path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            debug!(
                "skipping missing layer (source={:?}, path={})",
                source,
                path.display()
            );
            return Ok(());
        }
        if !self.seen_paths.insert(utils::unique_path(path)) {
            debug!(
                "skipping duplicate layer (source={:?}, path={})",
                source,
                path.display()
            );
            return Ok(());
        }
        let loaded = layer_io::load_required_layer(source, path)?;
        debug!(
            "loaded layer (source={:?}, path={})",
            source,
            path.display()
        );
        self.push(loaded);
        Ok(())
    }
}

fn config_from_value(value: Value, label: &str) -> Result<MnemosConfig, ConfigError> {
    schema::validate_layer_schema(&value, SchemaMode::Full, label)?;
    let config: MnemosConfig =
        serde_json::from_value(value).map_err(|source| ConfigError::DecodeFailed {
            layer: label.to_string(),
            source,
        })?;
    config.validate()?;
    Ok(config)
}
