//! HTTP embedding and synthesis providers for OpenAI-compatible APIs.

mod chat;
mod embeddings;
mod http;

/// Chat-completions synthesis provider.
pub use chat::{ChatSynthesizer, DEFAULT_CHAT_BASE_URL};
/// Embeddings provider.
pub use embeddings::{DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDINGS_BASE_URL, OpenAiEmbedder};
