use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::identity::IdentityRegistry;
use crate::ingestion::jobs::JobRegistry;
use crate::llm_client::LanguageModel;
use crate::retrieval::Retriever;
use crate::store::ChunkStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ChunkStore>,
    pub identities: Arc<dyn IdentityRegistry>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LanguageModel>,
    /// Present only when remote folder ingestion is configured.
    pub s3: Option<S3Client>,
    pub jobs: JobRegistry,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn ChunkStore>,
        identities: Arc<dyn IdentityRegistry>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        s3: Option<S3Client>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            identities,
            embedder,
            llm,
            s3,
            jobs: JobRegistry::new(),
        }
    }

    pub fn retriever(&self) -> Retriever {
        Retriever::new(
            self.store.clone(),
            self.embedder.clone(),
            self.config.vector_candidates,
        )
    }
}
