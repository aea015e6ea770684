//! Public SDK surface for Mnemos.
//!
//! This crate re-exports the memory building blocks, maps configuration
//! onto runtime providers, and provides a small initialization helper to
//! keep consumer setup consistent.

mod error;
pub mod runtime;
mod system;

/// Re-export for convenience.
pub use mnemos_config as config;
/// Re-export for convenience.
pub use mnemos_memory as memory;
/// Re-export for convenience.
pub use mnemos_providers as providers;

pub use error::MnemosError;
pub use system::{MemorySystem, MemorySystemBuilder};

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// This is a no-op if the feature is not enabled. Binaries are still expected
/// to call this early in startup to ensure log output is wired up.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::try_init();
    }
}
