use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::extraction;
use crate::identity::{IdentityResolver, LlmNameExtractor};
use crate::ingestion::indexer::{ChunkError, EmbeddingIndexer};
use crate::ingestion::sources::{DocumentSource, SourceError};
use crate::state::AppState;
use crate::store::{ChunkStore, StoreError};

/// Failures that stop a whole batch before any document is processed.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("failed to clear chunk store: {0}")]
    Store(#[from] StoreError),
}

impl From<IngestError> for crate::errors::AppError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Source(SourceError::FolderNotFound(folder)) => {
                crate::errors::AppError::NotFound(format!("Folder {folder} not found"))
            }
            IngestError::Source(e @ SourceError::OutsideRoot(_)) => {
                crate::errors::AppError::Validation(e.to_string())
            }
            IngestError::Source(other) => crate::errors::AppError::Internal(other.into()),
            IngestError::Store(e) => crate::errors::AppError::Store(e),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct IngestOptions {
    /// Clear the whole chunk store before processing.
    #[serde(default)]
    pub rebuild: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub filename: String,
    pub error: String,
}

/// Batch outcome. Per-file problems land here instead of failing the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionSummary {
    pub total_files_processed: usize,
    pub successful_files: Vec<String>,
    pub failed_files: Vec<FailedFile>,
    /// Already indexed before this run; also listed in `successful_files`.
    pub skipped_files: Vec<String>,
    pub total_pages_processed: usize,
    pub chunk_errors: Vec<ChunkError>,
    /// Indexed without a talent id; needs manual follow-up.
    pub unresolved_identities: Vec<String>,
    pub cancelled: bool,
}

impl IngestionSummary {
    fn succeed(&mut self, file_name: &str) {
        self.total_files_processed += 1;
        self.successful_files.push(file_name.to_string());
    }

    fn fail(&mut self, file_name: &str, error: impl ToString) {
        let error = error.to_string();
        warn!("Failed to ingest {file_name}: {error}");
        self.total_files_processed += 1;
        self.failed_files.push(FailedFile {
            filename: file_name.to_string(),
            error,
        });
    }

    fn skip(&mut self, file_name: &str) {
        info!("Skipping {file_name}: already indexed");
        self.skipped_files.push(file_name.to_string());
        self.succeed(file_name);
    }
}

/// Extract → resolve identity → index, per document.
pub struct IngestionPipeline {
    store: Arc<dyn ChunkStore>,
    resolver: IdentityResolver,
    indexer: EmbeddingIndexer,
    chunk_size: usize,
    timeout: Duration,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        resolver: IdentityResolver,
        indexer: EmbeddingIndexer,
        chunk_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            indexer,
            chunk_size,
            timeout,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        let timeout = state.config.external_timeout();
        let resolver = IdentityResolver::new(
            Arc::new(LlmNameExtractor::new(state.llm.clone())),
            state.identities.clone(),
            timeout,
        );
        let indexer = EmbeddingIndexer::new(
            state.store.clone(),
            state.embedder.clone(),
            state.config.embed_concurrency,
        );
        Self::new(
            state.store.clone(),
            resolver,
            indexer,
            state.config.chunk_size,
            timeout,
        )
    }

    /// Processes every PDF in `source`, one document at a time.
    ///
    /// Only a failure to list the source fails the call. Cancellation is
    /// checked between documents; finished documents stay indexed.
    pub async fn ingest_source(
        &self,
        source: &dyn DocumentSource,
        options: IngestOptions,
        cancel: &CancellationToken,
    ) -> Result<IngestionSummary, IngestError> {
        let documents = source.list().await?;
        info!("Ingesting {} PDFs from {}", documents.len(), source.describe());

        if options.rebuild {
            let deleted = self.store.clear().await?;
            info!("Rebuild requested: cleared {deleted} chunks");
        }

        let mut summary = IngestionSummary::default();
        for document in &documents {
            if cancel.is_cancelled() {
                info!(
                    "Ingestion cancelled after {} of {} files",
                    summary.total_files_processed,
                    documents.len()
                );
                summary.cancelled = true;
                break;
            }

            match self.is_indexed(&document.file_name).await {
                Ok(true) => {
                    summary.skip(&document.file_name);
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    summary.fail(&document.file_name, e);
                    continue;
                }
            }

            let fetched = tokio::time::timeout(self.timeout, source.fetch(document)).await;
            match fetched {
                Ok(Ok(bytes)) => {
                    self.process_document(&document.file_name, bytes, &mut summary)
                        .await
                }
                Ok(Err(e)) => summary.fail(&document.file_name, e),
                Err(_) => summary.fail(
                    &document.file_name,
                    format!("download timed out after {:?}", self.timeout),
                ),
            }
        }

        info!(
            "Ingestion finished: {} succeeded, {} failed, {} skipped, {} pages",
            summary.successful_files.len(),
            summary.failed_files.len(),
            summary.skipped_files.len(),
            summary.total_pages_processed
        );
        Ok(summary)
    }

    async fn is_indexed(&self, file_name: &str) -> Result<bool, StoreError> {
        self.indexer.is_indexed(file_name).await
    }

    /// Runs one document through the pipeline and records the result.
    pub async fn ingest_document(
        &self,
        file_name: &str,
        file_bytes: Bytes,
        summary: &mut IngestionSummary,
    ) {
        match self.is_indexed(file_name).await {
            Ok(true) => summary.skip(file_name),
            Ok(false) => self.process_document(file_name, file_bytes, summary).await,
            Err(e) => summary.fail(file_name, e),
        }
    }

    /// Extract, resolve and index a document already known to be new.
    async fn process_document(
        &self,
        file_name: &str,
        file_bytes: Bytes,
        summary: &mut IngestionSummary,
    ) {
        let document = match extraction::extract(file_bytes, file_name, self.chunk_size).await {
            Ok(document) => document,
            Err(e) => return summary.fail(file_name, e),
        };
        if document.chunks.is_empty() {
            return summary.fail(file_name, "no extractable text");
        }

        let identity = self.resolver.resolve_identity(&document.full_text()).await;
        let talent_id = identity.as_ref().map(|i| i.talent_id);
        if talent_id.is_none() {
            summary.unresolved_identities.push(file_name.to_string());
        }

        match self.indexer.index(&document, talent_id).await {
            Ok(report) => {
                summary.chunk_errors.extend(report.chunk_errors);
                if report.indexed == 0 {
                    return summary.fail(file_name, "no chunks could be indexed");
                }
                info!(
                    "Indexed {file_name}: {} chunks, {} pages, talent_id={:?}",
                    report.indexed, report.pages_indexed, talent_id
                );
                summary.total_pages_processed += report.pages_indexed;
                summary.succeed(file_name);
            }
            Err(e) => summary.fail(file_name, e),
        }
    }
}
