use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::extraction::ExtractedDocument;
use crate::models::chunk::{ChunkMetadata, NewChunk, RESUME_SOURCE_TAG};
use crate::store::{ChunkStore, StoreError};

/// A chunk that could not be embedded and was left out of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkError {
    pub file_name: String,
    pub chunk_number: u32,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: usize,
    /// Distinct pages with at least one indexed chunk.
    pub pages_indexed: usize,
    pub chunk_errors: Vec<ChunkError>,
}

/// Embeds a document's chunks and writes them as one unit of work.
pub struct EmbeddingIndexer {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    concurrency: usize,
}

impl EmbeddingIndexer {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            concurrency: concurrency.max(1),
        }
    }

    /// Checks whether `file_name` is already indexed without doing any work.
    pub async fn is_indexed(&self, file_name: &str) -> Result<bool, StoreError> {
        self.store.has_file(file_name).await
    }

    /// Failed chunks are skipped and reported; the rest are written in
    /// `chunk_number` order. Only store failures are errors.
    ///
    /// Callers check `is_indexed` first; this always writes.
    pub async fn index(
        &self,
        document: &ExtractedDocument,
        talent_id: Option<i64>,
    ) -> Result<IndexReport, StoreError> {
        // `buffered` keeps results in input order while running up to
        // `concurrency` embedding calls at once. The embedder bounds each of
        // its own attempts.
        let embedded: Vec<_> = stream::iter(document.chunks.iter().map(|chunk| async move {
            (chunk, self.embedder.embed(&chunk.chunk_text).await)
        }))
        .buffered(self.concurrency)
        .boxed()
        .collect()
        .await;

        let mut report = IndexReport::default();
        let mut pages = BTreeSet::new();
        let mut rows = Vec::with_capacity(embedded.len());

        for (chunk, result) in embedded {
            match result {
                Ok(embedding) => {
                    pages.insert(chunk.page_number);
                    rows.push(NewChunk {
                        text: chunk.chunk_text.clone(),
                        metadata: ChunkMetadata {
                            file_name: document.file_name.clone(),
                            page_number: Some(chunk.page_number as i32),
                            chunk_number: chunk.chunk_number as i32,
                            talent_id,
                            total_pages: document.total_pages as i32,
                            source_tag: RESUME_SOURCE_TAG.to_string(),
                        },
                        embedding,
                    });
                }
                Err(e) => {
                    warn!(
                        "Skipping chunk {} of {}: {e}",
                        chunk.chunk_number, document.file_name
                    );
                    report.chunk_errors.push(ChunkError {
                        file_name: document.file_name.clone(),
                        chunk_number: chunk.chunk_number,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !rows.is_empty() {
            report.indexed = self.store.insert_document(rows).await?;
            report.pages_indexed = pages.len();
        }
        debug!(
            "Indexed {} of {} chunks from {}",
            report.indexed,
            document.chunks.len(),
            document.file_name
        );
        Ok(report)
    }
}
