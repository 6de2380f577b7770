use serde::{Deserialize, Serialize};

/// Tag stored with every chunk produced by resume ingestion.
pub const RESUME_SOURCE_TAG: &str = "resume";

/// Provenance stored alongside each chunk's text and embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub file_name: String,
    pub page_number: Option<i32>,
    /// Contiguous from 1 within one extraction pass of `file_name`.
    pub chunk_number: i32,
    pub talent_id: Option<i64>,
    pub total_pages: i32,
    pub source_tag: String,
}

/// A chunk ready to be written to the store.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

/// A chunk as read back from the store. `id` follows insertion order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredChunk {
    pub id: i64,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A retrieval hit, ranked by `score` descending.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: StoredChunk,
    pub score: f32,
}

/// Source attribution attached to a recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub file_name: String,
    pub page_number: Option<i32>,
    pub talent_id: Option<i64>,
}

impl From<&StoredChunk> for SourceRef {
    fn from(chunk: &StoredChunk) -> Self {
        Self {
            file_name: chunk.metadata.file_name.clone(),
            page_number: chunk.metadata.page_number,
            talent_id: chunk.metadata.talent_id,
        }
    }
}
