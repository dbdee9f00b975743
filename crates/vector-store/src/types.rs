use serde::{Deserialize, Serialize};

/// Embedding vector; length is dictated by the provider and never validated
/// here.
pub type Vector = Vec<f32>;

/// Version stamp written into every database file.
pub const DATABASE_VERSION: u32 = 1;

/// A sub-document passage with its embedding, owned by its parent entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub contents: String,
    /// `None` means "not yet computed" — distinct from a zero vector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vector>,
}

/// Everything stored for one indexed note, keyed by path in the store.
///
/// When `document_embedding` is present, `content_hash` reflects the exact
/// body that produced it; staleness is detected solely by hash mismatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_embedding: Option<Vector>,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
}

impl FileEntry {
    /// True when at least one chunk still lacks its embedding (a previous
    /// run was interrupted or a batch failed).
    #[must_use]
    pub fn has_missing_chunk_embeddings(&self) -> bool {
        self.chunks.iter().any(|chunk| chunk.embedding.is_none())
    }
}

/// On-disk form of the whole store; always written as a full-file rewrite.
#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseFile {
    pub version: u32,
    pub embeddings: Vec<(String, FileEntry)>,
}

/// One ranked search result. `chunk` is `None` for a whole-document match.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub path: String,
    pub chunk: Option<String>,
    pub score: f32,
}
