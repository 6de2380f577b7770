//! Axum route handlers for ingestion and the resume store.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::AppError;
use crate::ingestion::jobs::JobView;
use crate::ingestion::pipeline::{IngestError, IngestOptions, IngestionPipeline, IngestionSummary};
use crate::ingestion::sources::{DocumentSource, LocalFolderSource, S3FolderSource};
use crate::models::chunk::StoredChunk;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LocalIngestRequest {
    pub folder: Option<String>,
    #[serde(default)]
    pub rebuild: bool,
}

#[derive(Debug, Deserialize)]
pub struct RemoteIngestRequest {
    pub prefix: String,
    #[serde(default)]
    pub rebuild: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum JobRequest {
    Local {
        folder: Option<String>,
        #[serde(default)]
        rebuild: bool,
    },
    Remote {
        prefix: String,
        #[serde(default)]
        rebuild: bool,
    },
}

#[derive(Debug, Serialize)]
pub struct JobStarted {
    pub job_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct StoreStatusResponse {
    pub total_documents: u64,
    pub unique_source_files: u64,
    pub unique_resumes: u64,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct FileChunksResponse {
    pub file_name: String,
    pub chunks: Vec<StoredChunk>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub status: &'static str,
    pub documents_deleted: u64,
    pub message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Sources
// ────────────────────────────────────────────────────────────────────────────

/// `folder`, when given, is a subfolder of the configured resume folder.
async fn local_source(
    state: &AppState,
    folder: Option<&str>,
) -> Result<Box<dyn DocumentSource>, AppError> {
    let source = LocalFolderSource::within(&state.config.resume_folder, folder)
        .await
        .map_err(IngestError::from)?;
    Ok(Box::new(source))
}

fn remote_source(state: &AppState, prefix: &str) -> Result<Box<dyn DocumentSource>, AppError> {
    match (&state.s3, &state.config.s3) {
        (Some(client), Some(settings)) => Ok(Box::new(S3FolderSource::new(
            client.clone(),
            settings.bucket.clone(),
            prefix,
        ))),
        _ => Err(AppError::Validation(
            "Remote folder ingestion is not configured".to_string(),
        )),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/ingest/local
pub async fn handle_ingest_local(
    State(state): State<AppState>,
    Json(req): Json<LocalIngestRequest>,
) -> Result<Json<IngestionSummary>, AppError> {
    let source = local_source(&state, req.folder.as_deref()).await?;
    let _guard = state.jobs.try_begin()?;
    let summary = IngestionPipeline::from_state(&state)
        .ingest_source(
            source.as_ref(),
            IngestOptions {
                rebuild: req.rebuild,
            },
            &CancellationToken::new(),
        )
        .await?;
    Ok(Json(summary))
}

/// POST /api/v1/ingest/remote
pub async fn handle_ingest_remote(
    State(state): State<AppState>,
    Json(req): Json<RemoteIngestRequest>,
) -> Result<Json<IngestionSummary>, AppError> {
    let source = remote_source(&state, &req.prefix)?;
    let _guard = state.jobs.try_begin()?;
    let summary = IngestionPipeline::from_state(&state)
        .ingest_source(
            source.as_ref(),
            IngestOptions {
                rebuild: req.rebuild,
            },
            &CancellationToken::new(),
        )
        .await?;
    Ok(Json(summary))
}

/// POST /api/v1/ingest/upload
/// Multipart form with a single PDF in the `file` field.
pub async fn handle_ingest_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestionSummary>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation("file field has no file name".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| AppError::Validation("Missing 'file' field".to_string()))?;
    if !file_name.to_ascii_lowercase().ends_with(".pdf") {
        return Err(AppError::Validation(format!(
            "Only PDF files are accepted, got '{file_name}'"
        )));
    }

    let _guard = state.jobs.try_begin()?;
    let mut summary = IngestionSummary::default();
    IngestionPipeline::from_state(&state)
        .ingest_document(&file_name, bytes, &mut summary)
        .await;
    Ok(Json(summary))
}

/// POST /api/v1/ingest/jobs
pub async fn handle_start_job(
    State(state): State<AppState>,
    Json(req): Json<JobRequest>,
) -> Result<(StatusCode, Json<JobStarted>), AppError> {
    let (source, options) = match req {
        JobRequest::Local { folder, rebuild } => (
            local_source(&state, folder.as_deref()).await?,
            IngestOptions { rebuild },
        ),
        JobRequest::Remote { prefix, rebuild } => {
            (remote_source(&state, &prefix)?, IngestOptions { rebuild })
        }
    };
    let guard = state.jobs.try_begin()?;
    let pipeline = IngestionPipeline::from_state(&state);

    let job_id = state
        .jobs
        .spawn(guard, move |cancel| async move {
            pipeline
                .ingest_source(source.as_ref(), options, &cancel)
                .await
        })
        .await;
    Ok((StatusCode::ACCEPTED, Json(JobStarted { job_id })))
}

/// GET /api/v1/ingest/jobs/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobView>, AppError> {
    state
        .jobs
        .get(job_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Ingestion job {job_id} not found")))
}

/// DELETE /api/v1/ingest/jobs/:id
pub async fn handle_cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<(StatusCode, Json<JobView>), AppError> {
    let view = state
        .jobs
        .cancel(job_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Ingestion job {job_id} not found")))?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}

/// GET /api/v1/resumes/status
pub async fn handle_store_status(
    State(state): State<AppState>,
) -> Result<Json<StoreStatusResponse>, AppError> {
    let stats = state.store.stats().await?;
    Ok(Json(StoreStatusResponse {
        total_documents: stats.total_documents,
        unique_source_files: stats.unique_source_files,
        unique_resumes: stats.unique_source_files,
        status: "active",
    }))
}

/// GET /api/v1/resumes/:file_name/chunks
/// Chunks of one source file in `chunk_number` order.
pub async fn handle_file_chunks(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> Result<Json<FileChunksResponse>, AppError> {
    let chunks = state.store.chunks_for_file(&file_name).await?;
    if chunks.is_empty() {
        return Err(AppError::NotFound(format!("No chunks indexed for {file_name}")));
    }
    Ok(Json(FileChunksResponse { file_name, chunks }))
}

/// DELETE /api/v1/resumes
pub async fn handle_reset_store(
    State(state): State<AppState>,
) -> Result<Json<ResetResponse>, AppError> {
    let _guard = state.jobs.try_begin()?;
    let documents_deleted = state.store.clear().await?;
    tracing::info!("Cleared {documents_deleted} chunks from the resume store");
    Ok(Json(ResetResponse {
        status: "success",
        documents_deleted,
        message: "Resume store cleared successfully".to_string(),
    }))
}
