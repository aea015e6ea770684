//! Errors raised while assembling a `MnemosConfig` from its layers.

use std::path::PathBuf;
use thiserror::Error;

/// Failure while loading or validating Mnemos config.
///
/// File-backed failures carry the offending path or layer label (for example
/// `cwd(/work/agent/mnemos.json5)` or `env`) so a broken layer can be found
/// without re-running with debug logging.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read mnemos config {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The layer is not valid JSON5.
    #[error("failed to parse {layer} layer: {source}")]
    ParseFailed {
        layer: String,
        #[source]
        source: json5::Error,
    },
    /// The merged value did not fit the `MnemosConfig` model.
    #[error("failed to decode {layer} config: {source}")]
    DecodeFailed {
        layer: String,
        #[source]
        source: serde_json::Error,
    },
    /// A field failed schema or range checks; `path` is dotted, e.g. `consolidation.min_batch`.
    #[error("invalid config at {path}: {message}")]
    InvalidField { path: String, message: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFailed {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(layer: impl Into<String>, source: json5::Error) -> Self {
        Self::ParseFailed {
            layer: layer.into(),
            source,
        }
    }
}
