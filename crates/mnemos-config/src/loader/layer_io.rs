//! Reading `mnemos.json5` layers from disk and locating the default ones.

use super::{
    ConfigLayer, ConfigLayerSource, DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILE, LoadedLayer,
    SYSTEM_CONFIG_PATH, SYSTEM_REQUIREMENTS_PATH, SchemaMode, schema,
};
use crate::ConfigError;
use directories::UserDirs;
use log::debug;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Load a layer that may be absent; a missing file contributes nothing.
pub(super) fn load_optional_layer(
    source: ConfigLayerSource,
    path: Option<&Path>,
) -> Result<Option<LoadedLayer>, ConfigError> {
    let Some(path) = path else {
        return Ok(None);
    };
    match fs::read_to_string(path) {
        Ok(contents) => parse_layer(source, path, &contents).map(Some),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("no {} layer at {}", source_name(source), path.display());
            Ok(None)
        }
        Err(err) => Err(ConfigError::read(path, err)),
    }
}

/// Load a layer the caller asked for explicitly; a missing file is an error.
pub(super) fn load_required_layer(
    source: ConfigLayerSource,
    path: &Path,
) -> Result<LoadedLayer, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|err| ConfigError::read(path, err))?;
    parse_layer(source, path, &contents)
}

fn parse_layer(
    source: ConfigLayerSource,
    path: &Path,
    contents: &str,
) -> Result<LoadedLayer, ConfigError> {
    let label = layer_label(source, Some(path));
    debug!("parsing config layer {label} ({} bytes)", contents.len());
    let value: Value =
        json5::from_str(contents).map_err(|err| ConfigError::parse(label.as_str(), err))?;
    schema::validate_layer_schema(&value, SchemaMode::Partial, &label)?;
    Ok(LoadedLayer {
        meta: ConfigLayer {
            source,
            path: Some(path.to_path_buf()),
        },
        value,
    })
}

fn source_name(source: ConfigLayerSource) -> &'static str {
    match source {
        ConfigLayerSource::Requirements => "requirements",
        ConfigLayerSource::System => "system",
        ConfigLayerSource::User => "user",
        ConfigLayerSource::Project => "project",
        ConfigLayerSource::Cwd => "cwd",
        ConfigLayerSource::Repo => "repo",
        ConfigLayerSource::Env => "env",
        ConfigLayerSource::Runtime => "runtime",
    }
}

/// Label used in errors, e.g. `cwd(/work/agent/mnemos.json5)` or `env`.
pub(super) fn layer_label(source: ConfigLayerSource, path: Option<&Path>) -> String {
    let name = source_name(source);
    match path {
        Some(path) => format!("{name}({})", path.display()),
        None => name.to_string(),
    }
}

/// `/etc/mnemos/mnemos.json5` (or the ProgramData equivalent).
#[cfg(any(unix, windows))]
pub(super) fn default_system_config_path() -> Option<PathBuf> {
    Some(PathBuf::from(SYSTEM_CONFIG_PATH))
}

/// `/etc/mnemos/requirements.json5` (or the ProgramData equivalent).
#[cfg(any(unix, windows))]
pub(super) fn default_requirements_path() -> Option<PathBuf> {
    Some(PathBuf::from(SYSTEM_REQUIREMENTS_PATH))
}

#[cfg(not(any(unix, windows)))]
pub(super) fn default_system_config_path() -> Option<PathBuf> {
    None
}

#[cfg(not(any(unix, windows)))]
pub(super) fn default_requirements_path() -> Option<PathBuf> {
    None
}

/// `~/.mnemos/mnemos.json5`.
pub(super) fn default_user_config_path() -> Option<PathBuf> {
    UserDirs::new().map(|dirs| {
        dirs.home_dir()
            .join(DEFAULT_CONFIG_DIR)
            .join(DEFAULT_CONFIG_FILE)
    })
}
