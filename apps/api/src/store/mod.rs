//! Chunk store: persisted resume chunks with their embeddings.
//!
//! `ChunkStore` is the seam between the pipeline and storage. Production runs
//! on `PgChunkStore` (pgvector + a generated tsvector column); `MemoryChunkStore`
//! backs tests and `STORE_BACKEND=memory`.
//!
//! Ordering contract shared by both backends: ties in any ranked result are
//! broken by insertion order (`StoredChunk::id` ascending).

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::chunk::{NewChunk, ScoredChunk, StoredChunk};

pub mod memory;
pub mod postgres;

pub use memory::MemoryChunkStore;
pub use postgres::PgChunkStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("uniqueness conflict on {0}")]
    Conflict(String),

    #[error("embedding has {actual} dimensions, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Aggregate counts reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_documents: u64,
    pub unique_source_files: u64,
}

/// A vector-search candidate: the stored chunk plus its embedding, so the
/// caller can re-rank the candidate pool exactly.
#[derive(Debug, Clone)]
pub struct VectorCandidate {
    pub chunk: StoredChunk,
    pub embedding: Vec<f32>,
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// True when at least one chunk for `file_name` exists.
    async fn has_file(&self, file_name: &str) -> Result<bool, StoreError>;

    /// Writes all chunks of one document as a single unit of work and returns
    /// the number of rows written.
    async fn insert_document(&self, chunks: Vec<NewChunk>) -> Result<usize, StoreError>;

    /// Full-text relevance search. Only chunks matching at least one query term
    /// are returned, best first.
    async fn text_search(
        &self,
        query: &str,
        limit: usize,
        file_filter: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, StoreError>;

    /// Returns up to `candidates` chunks nearest to `embedding` by cosine distance.
    async fn nearest(
        &self,
        embedding: &[f32],
        candidates: usize,
        file_filter: Option<&str>,
    ) -> Result<Vec<VectorCandidate>, StoreError>;

    /// All chunks of one file in `chunk_number` order.
    async fn chunks_for_file(&self, file_name: &str) -> Result<Vec<StoredChunk>, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Deletes every chunk and returns how many were removed.
    async fn clear(&self) -> Result<u64, StoreError>;
}

/// Lowercased alphanumeric terms of a search query, deduplicated in order of
/// first appearance. Single-character terms are dropped.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in tokenize(query) {
        if term.chars().count() > 1 && !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Splits text into lowercased alphanumeric tokens.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}
