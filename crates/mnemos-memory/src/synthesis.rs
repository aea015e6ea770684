//! Synthesis provider interface used by consolidation.

use crate::error::ProviderError;
use async_trait::async_trait;

/// Built-in instruction sent with every consolidation batch.
pub const DEFAULT_CONSOLIDATION_INSTRUCTION: &str = "You are a memory consolidation agent. \
Your task is to analyze fragments of experience and synthesize them into coherent insights, \
patterns, or solutions.

Create a concise summary that:
1. Identifies key themes and patterns
2. Extracts actionable insights
3. Connects related concepts
4. Preserves important details

Respond with a well-structured synthesis that could serve as a stable memory for future reference.";

#[async_trait]
/// Turns a batch of texts plus an instruction into one text.
pub trait SynthesisProvider: Send + Sync {
    async fn synthesize(&self, instruction: &str, texts: &[String])
    -> Result<String, ProviderError>;

    /// Identity shown in stats and stored as `consolidated_by`.
    fn name(&self) -> String;
}

/// Render fragment texts as the user-facing part of a consolidation request.
pub fn render_fragments(texts: &[String]) -> String {
    let listing = texts
        .iter()
        .map(|text| format!("- {text}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Consolidate these memory fragments into a coherent insight or solution:\n\n{listing}\n\n\
Provide a clear, actionable synthesis that captures the essential patterns and insights."
    )
}

/// Placeholder used when no synthesis provider is configured.
#[derive(Debug, Clone, Default)]
pub struct DisabledSynthesizer;

#[async_trait]
impl SynthesisProvider for DisabledSynthesizer {
    async fn synthesize(
        &self,
        _instruction: &str,
        _texts: &[String],
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Unavailable(
            "no synthesis provider configured".to_string(),
        ))
    }

    fn name(&self) -> String {
        "disabled".to_string()
    }
}
