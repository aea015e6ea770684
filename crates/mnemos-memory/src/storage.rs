//! On-disk artifacts for one namespace.
//!
//! `index.vectors` is written first and `index.json` last, each through a
//! temp file and rename, so the metadata file is the commit point.

use crate::embedder::EmbedderInfo;
use crate::error::StorageError;
use crate::flat::FlatIndex;
use crate::model::MemoryRecord;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const METADATA_FILE: &str = "index.json";
pub const VECTORS_FILE: &str = "index.vectors";
pub const EMBEDDING_FILE: &str = "embedding.json";

const FORMAT_VERSION: u32 = 1;
const VECTORS_MAGIC: &[u8; 4] = b"MNVX";
const VECTORS_VERSION: u32 = 1;
const VECTORS_HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// Contents of `index.json`.
#[derive(Debug, Deserialize)]
pub(crate) struct IndexMetadata {
    pub(crate) format_version: u32,
    pub(crate) next_slot: usize,
    pub(crate) records: Vec<MemoryRecord>,
}

#[derive(Serialize)]
struct IndexMetadataRef<'a> {
    format_version: u32,
    next_slot: usize,
    records: &'a [MemoryRecord],
}

/// Paths and codecs for a namespace directory.
#[derive(Debug, Clone)]
pub(crate) struct IndexArtifacts {
    dir: PathBuf,
}

impl IndexArtifacts {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    fn vectors_path(&self) -> PathBuf {
        self.dir.join(VECTORS_FILE)
    }

    fn embedding_path(&self) -> PathBuf {
        self.dir.join(EMBEDDING_FILE)
    }

    /// Read `index.json`; `Ok(None)` when it does not exist yet.
    pub(crate) fn read_metadata(&self) -> Result<Option<IndexMetadata>, StorageError> {
        let path = self.metadata_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read(&path)?;
        let metadata: IndexMetadata = serde_json::from_slice(&contents)?;
        if metadata.format_version != FORMAT_VERSION {
            return Err(StorageError::Corrupt(format!(
                "unsupported metadata format version {}",
                metadata.format_version
            )));
        }
        Ok(Some(metadata))
    }

    /// Read `index.vectors`; `Ok(None)` when it does not exist.
    pub(crate) fn read_vectors(&self) -> Result<Option<FlatIndex>, StorageError> {
        let path = self.vectors_path();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        decode_vectors(&bytes).map(Some)
    }

    /// Rewrite every artifact from the given state.
    pub(crate) fn write(
        &self,
        records: &[MemoryRecord],
        next_slot: usize,
        vectors: &FlatIndex,
        embedder: &EmbedderInfo,
    ) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        write_atomic(&self.vectors_path(), &encode_vectors(vectors))?;
        write_atomic(
            &self.embedding_path(),
            &serde_json::to_vec_pretty(embedder)?,
        )?;
        let metadata = IndexMetadataRef {
            format_version: FORMAT_VERSION,
            next_slot,
            records,
        };
        write_atomic(&self.metadata_path(), &serde_json::to_vec(&metadata)?)?;
        debug!(
            "index artifacts written (dir={}, records={}, vectors={})",
            self.dir.display(),
            records.len(),
            vectors.len()
        );
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| StorageError::Corrupt(format!("bad artifact path {}", path.display())))?;
    let temp_path = path.with_file_name(format!("{file_name}.tmp"));
    {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

pub(crate) fn encode_vectors(vectors: &FlatIndex) -> Vec<u8> {
    let raw = vectors.as_raw();
    let mut bytes = Vec::with_capacity(VECTORS_HEADER_LEN + raw.len() * 4);
    bytes.extend_from_slice(VECTORS_MAGIC);
    bytes.extend_from_slice(&VECTORS_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(vectors.dimension() as u32).to_le_bytes());
    bytes.extend_from_slice(&(vectors.len() as u64).to_le_bytes());
    bytes.extend(raw.iter().flat_map(|value| value.to_le_bytes()));
    bytes
}

pub(crate) fn decode_vectors(bytes: &[u8]) -> Result<FlatIndex, StorageError> {
    if bytes.len() < VECTORS_HEADER_LEN {
        return Err(StorageError::Corrupt("vector file shorter than header".to_string()));
    }
    let (header, body) = bytes.split_at(VECTORS_HEADER_LEN);
    if &header[0..4] != VECTORS_MAGIC {
        return Err(StorageError::Corrupt("bad vector file magic".to_string()));
    }
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if version != VECTORS_VERSION {
        return Err(StorageError::Corrupt(format!(
            "unsupported vector file version {version}"
        )));
    }
    let dimension = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header[12..20]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    let expected = count
        .checked_mul(dimension)
        .and_then(|values| values.checked_mul(4))
        .ok_or_else(|| StorageError::Corrupt("vector file header overflows".to_string()))?;
    if body.len() != expected {
        return Err(StorageError::Corrupt(format!(
            "vector payload is {} bytes, header promises {expected}",
            body.len()
        )));
    }

    let data: Vec<f32> = body
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    FlatIndex::from_raw(dimension, data)
        .ok_or_else(|| StorageError::Corrupt("vector file has zero dimension".to_string()))
}
