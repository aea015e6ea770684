//! Test helpers shared across Mnemos crates.

pub mod embedder;
pub mod synthesis;

pub use embedder::{FailingEmbedder, StubEmbedder};
pub use synthesis::{
    FailingSynthesizer, FixedSynthesizer, RecordingSynthesizer, SlowSynthesizer, SynthesisCall,
};
