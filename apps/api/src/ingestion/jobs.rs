//! Background ingestion jobs and the single-ingestion lock.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::ingestion::pipeline::{IngestError, IngestionSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<IngestionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct JobRecord {
    view: JobView,
    cancel: CancellationToken,
}

/// Held for the duration of one ingestion, inline or background.
pub type IngestGuard = OwnedMutexGuard<()>;

/// Finished jobs kept for status queries; older ones are dropped.
const FINISHED_JOBS_KEPT: usize = 100;

/// Tracks background jobs and serialises all ingestion through one lock.
/// Query handlers never touch the lock.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, JobRecord>>>,
    ingest_lock: Arc<Mutex<()>>,
    finished_kept: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::keeping(FINISHED_JOBS_KEPT)
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that remembers at most `finished_kept` finished jobs.
    pub fn keeping(finished_kept: usize) -> Self {
        Self {
            jobs: Arc::default(),
            ingest_lock: Arc::default(),
            finished_kept,
        }
    }

    /// Claims the ingestion lock, or `Conflict` when another ingestion runs.
    pub fn try_begin(&self) -> Result<IngestGuard, AppError> {
        self.ingest_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| AppError::Conflict("An ingestion is already running".to_string()))
    }

    /// Starts `run` on a tokio task. The guard is released when it finishes.
    pub async fn spawn<F, Fut>(&self, guard: IngestGuard, run: F) -> Uuid
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<IngestionSummary, IngestError>> + Send + 'static,
    {
        let job_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let record = JobRecord {
            view: JobView {
                job_id,
                status: JobStatus::Running,
                started_at: Utc::now(),
                finished_at: None,
                summary: None,
                error: None,
            },
            cancel: cancel.clone(),
        };
        self.jobs.write().await.insert(job_id, record);

        let jobs = self.jobs.clone();
        let finished_kept = self.finished_kept;
        tokio::spawn(async move {
            let _guard = guard;
            // Inner task so a panic in the pipeline still settles the record.
            let result = tokio::spawn(run(cancel)).await;

            let mut jobs = jobs.write().await;
            let Some(record) = jobs.get_mut(&job_id) else {
                return;
            };
            record.view.finished_at = Some(Utc::now());
            match result {
                Ok(Ok(summary)) => {
                    record.view.status = if summary.cancelled {
                        JobStatus::Cancelled
                    } else {
                        JobStatus::Completed
                    };
                    info!("Ingestion job {job_id} finished: {:?}", record.view.status);
                    record.view.summary = Some(summary);
                }
                Ok(Err(e)) => {
                    error!("Ingestion job {job_id} failed: {e}");
                    record.view.status = JobStatus::Failed;
                    record.view.error = Some(e.to_string());
                }
                Err(join_error) => {
                    error!("Ingestion job {job_id} aborted: {join_error}");
                    record.view.status = JobStatus::Failed;
                    record.view.error = Some(format!("ingestion task aborted: {join_error}"));
                }
            }
            prune_finished(&mut jobs, finished_kept);
        });

        info!("Started ingestion job {job_id}");
        job_id
    }

    pub async fn get(&self, job_id: Uuid) -> Option<JobView> {
        self.jobs.read().await.get(&job_id).map(|r| r.view.clone())
    }

    /// Requests cancellation; takes effect before the next document.
    pub async fn cancel(&self, job_id: Uuid) -> Option<JobView> {
        let jobs = self.jobs.read().await;
        let record = jobs.get(&job_id)?;
        if record.view.status == JobStatus::Running {
            info!("Cancellation requested for ingestion job {job_id}");
            record.cancel.cancel();
        }
        Some(record.view.clone())
    }
}

/// Drops the oldest finished records beyond `keep`. Running jobs stay.
fn prune_finished(jobs: &mut HashMap<Uuid, JobRecord>, keep: usize) {
    let mut finished: Vec<(DateTime<Utc>, Uuid)> = jobs
        .values()
        .filter_map(|r| r.view.finished_at.map(|at| (at, r.view.job_id)))
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort();
    let excess = finished.len() - keep;
    for (_, job_id) in finished.into_iter().take(excess) {
        jobs.remove(&job_id);
    }
}
