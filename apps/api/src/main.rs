mod assembly;
mod config;
mod db;
mod embedding;
mod errors;
mod extraction;
mod identity;
mod ingestion;
mod llm_client;
mod models;
mod retrieval;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, S3Settings, StoreBackend};
use crate::db::create_pool;
use crate::embedding::{Embedder, HttpEmbedder};
use crate::identity::{IdentityRegistry, MemoryIdentityRegistry, PgIdentityRegistry};
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{ChunkStore, MemoryChunkStore, PgChunkStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting talent-rag API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize chunk store and identity registry
    let (store, identities): (Arc<dyn ChunkStore>, Arc<dyn IdentityRegistry>) =
        match config.store_backend {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for postgres"))?;
                let db = create_pool(url).await?;
                info!("PostgreSQL store initialized");
                (
                    Arc::new(PgChunkStore::new(db.clone())),
                    Arc::new(PgIdentityRegistry::new(db)),
                )
            }
            StoreBackend::Memory => {
                info!("In-memory store initialized; data is lost on restart");
                (
                    Arc::new(MemoryChunkStore::new()),
                    Arc::new(MemoryIdentityRegistry::new()),
                )
            }
        };

    // Initialize embedding client
    let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(
        &config.embedding_api_key,
        &config.embedding_base_url,
        config.embedding_model.clone(),
        config.embedding_dimensions,
        config.external_timeout(),
    )?);
    info!(
        "Embedding client initialized (model: {}, dimensions: {})",
        config.embedding_model,
        embedder.dimensions()
    );

    // Initialize LLM client
    let llm = Arc::new(LlmClient::new(
        config.anthropic_api_key.clone(),
        config.external_timeout(),
    )?);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Initialize S3 / MinIO for remote folder ingestion
    let s3 = match &config.s3 {
        Some(settings) => {
            let client = build_s3_client(settings).await;
            info!("S3 client initialized (bucket: {})", settings.bucket);
            Some(client)
        }
        None => {
            info!("S3 not configured; remote folder ingestion disabled");
            None
        }
    };

    let port = config.port;
    let state = AppState::new(config, store, identities, embedder, llm, s3);

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// S3 client for the remote resume folder. Path-style addressing keeps MinIO
/// endpoints working alongside AWS.
async fn build_s3_client(settings: &S3Settings) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &settings.access_key_id,
        &settings.secret_access_key,
        None,
        None,
        "talent-rag-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&settings.endpoint)
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}
