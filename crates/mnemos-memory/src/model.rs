//! Memory record model used by the index and the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Lowercase hex SHA-256 of the UTF-8 text; the dedup key for records.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Category label attached to every record.
///
/// The well-known areas get their own variants; anything else is kept as
/// [`MemoryArea::Custom`]. On disk an area is always a plain lowercase string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemoryArea {
    /// Raw, unprocessed observations. Input to consolidation.
    Fragments,
    /// Distilled summaries produced by consolidation.
    Solutions,
    Contemplations,
    Instruments,
    Main,
    Custom(String),
}

impl MemoryArea {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Fragments => "fragments",
            Self::Solutions => "solutions",
            Self::Contemplations => "contemplations",
            Self::Instruments => "instruments",
            Self::Main => "main",
            Self::Custom(name) => name,
        }
    }
}

impl From<&str> for MemoryArea {
    fn from(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "fragments" => Self::Fragments,
            "solutions" => Self::Solutions,
            "contemplations" => Self::Contemplations,
            "instruments" => Self::Instruments,
            "main" => Self::Main,
            _ => Self::Custom(normalized),
        }
    }
}

impl From<String> for MemoryArea {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<MemoryArea> for String {
    fn from(value: MemoryArea) -> Self {
        match value {
            MemoryArea::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for MemoryArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted memory record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    /// Record identifier.
    pub id: Uuid,
    /// Record text, never modified after insert.
    pub text: String,
    pub area: MemoryArea,
    /// Caller metadata plus injected provenance keys.
    pub metadata: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Lowercase hex SHA-256 of the UTF-8 text.
    pub content_hash: String,
    /// Position of this record's vector in the similarity structure.
    pub vector_slot: usize,
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    pub id: Uuid,
    pub text: String,
    pub area: MemoryArea,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// Inner product of the normalized query and record vectors.
    pub score: f32,
    /// 1-based position in the returned list.
    pub rank: usize,
}

/// Result of a single insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted(Uuid),
    /// Text already stored; carries the id of the existing record.
    Duplicate(Uuid),
}

impl AddOutcome {
    /// Id of the newly inserted record, or `None` for a duplicate.
    pub fn inserted(self) -> Option<Uuid> {
        match self {
            Self::Inserted(id) => Some(id),
            Self::Duplicate(_) => None,
        }
    }

    /// Id of the record holding this text, new or existing.
    pub fn id(self) -> Uuid {
        match self {
            Self::Inserted(id) | Self::Duplicate(id) => id,
        }
    }
}

/// Input for [`crate::VectorIndex::add_batch`].
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub text: String,
    pub area: MemoryArea,
    pub metadata: serde_json::Value,
}

impl BatchItem {
    pub fn new(text: impl Into<String>, area: impl Into<MemoryArea>) -> Self {
        Self {
            text: text.into(),
            area: area.into(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
