//! Retriever: top-K chunks for a free-text query.
//!
//! Two independent modes. `Lexical` ranks by the store's full-text relevance;
//! `Vector` embeds the query, pulls a candidate pool of nearest chunks and
//! re-ranks it by exact cosine similarity before truncating. Ties keep
//! insertion order in both modes, so a fixed store and query always produce
//! the same ordered result.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::embedding::{Embedder, EmbeddingError};
use crate::models::chunk::ScoredChunk;
use crate::store::{ChunkStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Lexical,
    #[default]
    Vector,
}

impl FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexical" | "text" => Ok(Self::Lexical),
            "vector" => Ok(Self::Vector),
            other => Err(format!(
                "unknown retrieval mode '{other}' (expected 'lexical' or 'vector')"
            )),
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexical => f.write_str("lexical"),
            Self::Vector => f.write_str("vector"),
        }
    }
}

/// Retrieval could not be performed. An empty result is not an error.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("chunk store query failed: {0}")]
    Store(#[from] StoreError),
}

impl From<RetrievalError> for crate::errors::AppError {
    fn from(e: RetrievalError) -> Self {
        crate::errors::AppError::Retrieval(e.to_string())
    }
}

/// Cosine similarity between two vectors, in [-1, 1]. Mismatched lengths and
/// zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    vector_candidates: usize,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
        vector_candidates: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            vector_candidates,
        }
    }

    pub async fn retrieve(
        &self,
        query: &str,
        limit: usize,
        mode: RetrievalMode,
        file_filter: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let results = match mode {
            RetrievalMode::Lexical => self.store.text_search(query, limit, file_filter).await?,
            RetrievalMode::Vector => self.vector_search(query, limit, file_filter).await?,
        };

        debug!(
            "Retrieved {} chunks ({mode}, limit {limit}) for query '{query}'",
            results.len()
        );
        Ok(results)
    }

    async fn vector_search(
        &self,
        query: &str,
        limit: usize,
        file_filter: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        // The embedder bounds each of its own attempts; no outer deadline here.
        let embedding = self.embedder.embed(query).await?;

        // The pool is never smaller than what the caller asked for.
        let pool_size = self.vector_candidates.max(limit);
        let pool = self.store.nearest(&embedding, pool_size, file_filter).await?;

        let mut ranked: Vec<ScoredChunk> = pool
            .into_iter()
            .map(|candidate| ScoredChunk {
                score: cosine_similarity(&embedding, &candidate.embedding),
                chunk: candidate.chunk,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.chunk.id.cmp(&b.chunk.id))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }
}
