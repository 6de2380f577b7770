use std::collections::BTreeSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::chunk::{NewChunk, ScoredChunk, StoredChunk};
use crate::store::{query_terms, tokenize, ChunkStore, StoreError, StoreStats, VectorCandidate};

/// In-process chunk store for development and testing.
///
/// Lexical search scores by matched query-term occurrences normalised by chunk
/// length; vector search is brute-force cosine similarity. Records are kept in
/// insertion order, so stable sorts give the documented tie-break for free.
#[derive(Default)]
pub struct MemoryChunkStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    dimensions: Option<usize>,
    records: Vec<Record>,
}

struct Record {
    chunk: StoredChunk,
    embedding: Vec<f32>,
    tokens: Vec<String>,
}

impl MemoryChunkStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn has_file(&self, file_name: &str) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .any(|r| r.chunk.metadata.file_name == file_name))
    }

    async fn insert_document(&self, chunks: Vec<NewChunk>) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;

        // Validate the whole document before touching the records so a bad
        // chunk leaves the store unchanged.
        let mut expected = inner.dimensions;
        for chunk in &chunks {
            let actual = chunk.embedding.len();
            match expected {
                Some(dims) if dims != actual => {
                    return Err(StoreError::DimensionMismatch {
                        expected: dims,
                        actual,
                    })
                }
                _ => expected = Some(actual),
            }
            let duplicate = inner.records.iter().any(|r| {
                r.chunk.metadata.file_name == chunk.metadata.file_name
                    && r.chunk.metadata.chunk_number == chunk.metadata.chunk_number
            });
            if duplicate {
                return Err(StoreError::Conflict(format!(
                    "{} chunk {}",
                    chunk.metadata.file_name, chunk.metadata.chunk_number
                )));
            }
        }
        inner.dimensions = expected;

        let written = chunks.len();
        for chunk in chunks {
            inner.next_id += 1;
            let tokens = tokenize(&chunk.text).collect::<Vec<_>>();
            let id = inner.next_id;
            inner.records.push(Record {
                chunk: StoredChunk {
                    id,
                    text: chunk.text,
                    metadata: chunk.metadata,
                },
                embedding: chunk.embedding,
                tokens,
            });
        }
        Ok(written)
    }

    async fn text_search(
        &self,
        query: &str,
        limit: usize,
        file_filter: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let terms = query_terms(query);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let inner = self.inner.read().await;
        let mut hits: Vec<ScoredChunk> = inner
            .records
            .iter()
            .filter(|r| matches_filter(r, file_filter))
            .filter_map(|r| {
                let matched = r.tokens.iter().filter(|t| terms.contains(t)).count();
                if matched == 0 {
                    return None;
                }
                let score = matched as f32 / (r.tokens.len() as f32).sqrt();
                Some(ScoredChunk {
                    chunk: r.chunk.clone(),
                    score,
                })
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn nearest(
        &self,
        embedding: &[f32],
        candidates: usize,
        file_filter: Option<&str>,
    ) -> Result<Vec<VectorCandidate>, StoreError> {
        let inner = self.inner.read().await;
        if let Some(dims) = inner.dimensions {
            if dims != embedding.len() {
                return Err(StoreError::DimensionMismatch {
                    expected: dims,
                    actual: embedding.len(),
                });
            }
        }

        let mut scored: Vec<(f32, &Record)> = inner
            .records
            .iter()
            .filter(|r| matches_filter(r, file_filter))
            .map(|r| (crate::retrieval::cosine_similarity(embedding, &r.embedding), r))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(candidates)
            .map(|(_, r)| VectorCandidate {
                chunk: r.chunk.clone(),
                embedding: r.embedding.clone(),
            })
            .collect())
    }

    async fn chunks_for_file(&self, file_name: &str) -> Result<Vec<StoredChunk>, StoreError> {
        let inner = self.inner.read().await;
        let mut chunks: Vec<StoredChunk> = inner
            .records
            .iter()
            .filter(|r| r.chunk.metadata.file_name == file_name)
            .map(|r| r.chunk.clone())
            .collect();
        chunks.sort_by_key(|c| c.metadata.chunk_number);
        Ok(chunks)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let inner = self.inner.read().await;
        let files: BTreeSet<&str> = inner
            .records
            .iter()
            .map(|r| r.chunk.metadata.file_name.as_str())
            .collect();
        Ok(StoreStats {
            total_documents: inner.records.len() as u64,
            unique_source_files: files.len() as u64,
        })
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let deleted = inner.records.len() as u64;
        inner.records.clear();
        inner.dimensions = None;
        Ok(deleted)
    }
}

fn matches_filter(record: &Record, file_filter: Option<&str>) -> bool {
    file_filter.map_or(true, |f| record.chunk.metadata.file_name == f)
}
