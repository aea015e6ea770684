//! Error type for the Mnemos facade.

use mnemos_config::ConfigError;
use mnemos_memory::MemoryError;
use thiserror::Error;

/// Errors returned while assembling or using a [`crate::MemorySystem`].
#[derive(Debug, Error)]
pub enum MnemosError {
    /// Loading or validating configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The memory layer failed.
    #[error(transparent)]
    Memory(#[from] MemoryError),
    /// A hosted provider was selected but its API key is not set.
    #[error("{provider} provider requires an API key in ${env}")]
    MissingApiKey { provider: String, env: String },
    /// No storage root could be resolved.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
