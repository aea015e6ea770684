//! Namespace registry handing out one shared mind per namespace.

use crate::embedder::EmbeddingProvider;
use crate::error::MemoryError;
use crate::mind::{MemoryMind, MemoryMindOptions};
use crate::synthesis::SynthesisProvider;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Opens namespaces under a shared root directory.
///
/// Every namespace lives in `<root>/<namespace>/`. Opening is serialized so
/// concurrent callers asking for the same namespace get the same handle.
pub struct MemoryRegistry {
    root: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    synthesizer: Arc<dyn SynthesisProvider>,
    options: MemoryMindOptions,
    minds: Mutex<HashMap<String, Arc<MemoryMind>>>,
}

impl MemoryRegistry {
    pub fn new(
        root: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingProvider>,
        synthesizer: Arc<dyn SynthesisProvider>,
        options: MemoryMindOptions,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            embedder,
            synthesizer,
            options,
            minds: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the mind for `namespace`, opening it on first use. Starts the
    /// background scheduler when the consolidation policy enables it.
    pub async fn open(&self, namespace: &str) -> Result<Arc<MemoryMind>, MemoryError> {
        validate_namespace(namespace)?;
        let mut minds = self.minds.lock().await;
        if let Some(mind) = minds.get(namespace) {
            debug!("reusing memory namespace (namespace={namespace})");
            return Ok(mind.clone());
        }

        let mind = Arc::new(
            MemoryMind::open(
                namespace,
                self.root.join(namespace),
                self.embedder.clone(),
                self.synthesizer.clone(),
                self.options.clone(),
            )
            .await?,
        );
        if self.options.consolidation.background {
            mind.start_background();
        }
        info!(
            "memory namespace opened (namespace={}, root={})",
            namespace,
            self.root.display()
        );
        minds.insert(namespace.to_string(), mind.clone());
        Ok(mind)
    }

    /// Already-open mind for `namespace`, if any.
    pub async fn get(&self, namespace: &str) -> Option<Arc<MemoryMind>> {
        self.minds.lock().await.get(namespace).cloned()
    }

    /// Names of the open namespaces, sorted.
    pub async fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.minds.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop every scheduler and flush every index.
    pub async fn shutdown(&self) {
        let minds: Vec<Arc<MemoryMind>> = self
            .minds
            .lock()
            .await
            .drain()
            .map(|(_, mind)| mind)
            .collect();
        for mind in minds {
            mind.stop_background().await;
            if let Err(err) = mind.persist() {
                warn!(
                    "failed to flush namespace on shutdown (namespace={}, error={})",
                    mind.namespace(),
                    err
                );
            }
        }
    }
}

/// Namespaces become directory names, so only plain names are allowed.
fn validate_namespace(namespace: &str) -> Result<(), MemoryError> {
    let valid = !namespace.is_empty()
        && namespace != "."
        && namespace != ".."
        && namespace
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(MemoryError::InvalidNamespace(namespace.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::validate_namespace;

    #[test]
    fn namespace_names_are_plain() {
        assert!(validate_namespace("daemon").is_ok());
        assert!(validate_namespace("agent-2.v1").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b", "with space"] {
            assert!(validate_namespace(bad).is_err(), "{bad}");
        }
    }
}
