use anyhow::{bail, Context, Result};
use std::str::FromStr;

use crate::db::STORED_EMBEDDING_DIMENSIONS;
use crate::extraction::DEFAULT_CHUNK_SIZE;
use crate::retrieval::RetrievalMode;

/// Which chunk store / identity registry implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// S3 settings for the remote folder source. Present only when all four
/// variables are set.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub anthropic_api_key: String,
    pub embedding_api_key: String,
    pub embedding_base_url: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub resume_folder: String,
    pub s3: Option<S3Settings>,
    pub chunk_size: usize,
    pub retrieval_limit: usize,
    pub vector_candidates: usize,
    pub retrieval_mode: RetrievalMode,
    pub embed_concurrency: usize,
    pub external_timeout_secs: u64,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let store_backend = match optional_env("STORE_BACKEND").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => bail!("STORE_BACKEND must be 'postgres' or 'memory', got '{other}'"),
        };

        let database_url = match store_backend {
            StoreBackend::Postgres => Some(require_env("DATABASE_URL")?),
            StoreBackend::Memory => optional_env("DATABASE_URL"),
        };

        let retrieval_mode = match optional_env("RETRIEVAL_MODE") {
            Some(raw) => RetrievalMode::from_str(&raw)
                .map_err(|e| anyhow::anyhow!(e))
                .context("RETRIEVAL_MODE is invalid")?,
            None => RetrievalMode::default(),
        };

        let config = Config {
            store_backend,
            database_url,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            embedding_api_key: require_env("EMBEDDING_API_KEY")?,
            embedding_base_url: optional_env("EMBEDDING_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            embedding_model: optional_env("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            embedding_dimensions: parse_env("EMBEDDING_DIMENSIONS", STORED_EMBEDDING_DIMENSIONS)?,
            resume_folder: optional_env("RESUME_FOLDER").unwrap_or_else(|| "cv".to_string()),
            s3: load_s3_settings()?,
            chunk_size: parse_env("CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            retrieval_limit: parse_env("RETRIEVAL_LIMIT", 5)?,
            vector_candidates: parse_env("VECTOR_CANDIDATES", 10)?,
            retrieval_mode,
            embed_concurrency: parse_env("EMBED_CONCURRENCY", 5)?,
            external_timeout_secs: parse_env("EXTERNAL_TIMEOUT_SECS", 60)?,
            port: parse_env("PORT", 8080)?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks that parsing alone cannot catch.
    pub fn validate(&self) -> Result<()> {
        if self.store_backend == StoreBackend::Postgres
            && self.embedding_dimensions != STORED_EMBEDDING_DIMENSIONS
        {
            bail!(
                "EMBEDDING_DIMENSIONS is {} but the postgres embedding column holds {}; \
                 add a migration before changing it",
                self.embedding_dimensions,
                STORED_EMBEDDING_DIMENSIONS
            );
        }
        Ok(())
    }

    pub fn external_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.external_timeout_secs)
    }
}

fn load_s3_settings() -> Result<Option<S3Settings>> {
    let bucket = optional_env("S3_BUCKET");
    let endpoint = optional_env("S3_ENDPOINT");
    let access = optional_env("AWS_ACCESS_KEY_ID");
    let secret = optional_env("AWS_SECRET_ACCESS_KEY");

    match (bucket, endpoint, access, secret) {
        (Some(bucket), Some(endpoint), Some(access_key_id), Some(secret_access_key)) => {
            Ok(Some(S3Settings {
                bucket,
                endpoint,
                access_key_id,
                secret_access_key,
            }))
        }
        (None, None, None, None) => Ok(None),
        _ => bail!(
            "S3_BUCKET, S3_ENDPOINT, AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together"
        ),
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test owns its variable names; the process environment is shared.

    #[test]
    fn test_parse_env_uses_default_when_unset() {
        assert_eq!(parse_env("TALENT_RAG_TEST_UNSET", 42usize).unwrap(), 42);
    }

    #[test]
    fn test_parse_env_reads_and_rejects() {
        std::env::set_var("TALENT_RAG_TEST_LIMIT", " 7 ");
        assert_eq!(parse_env("TALENT_RAG_TEST_LIMIT", 5usize).unwrap(), 7);

        std::env::set_var("TALENT_RAG_TEST_PORT", "eighty");
        let err = parse_env("TALENT_RAG_TEST_PORT", 8080u16).unwrap_err();
        assert!(err.to_string().contains("TALENT_RAG_TEST_PORT"));
    }

    #[test]
    fn test_postgres_requires_stored_embedding_width() {
        let mut config = crate::test_support::test_config();
        assert!(config.validate().is_ok());

        config.store_backend = StoreBackend::Postgres;
        config.embedding_dimensions = 1536;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("EMBEDDING_DIMENSIONS"));

        config.embedding_dimensions = STORED_EMBEDDING_DIMENSIONS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        std::env::set_var("TALENT_RAG_TEST_BLANK", "   ");
        assert_eq!(optional_env("TALENT_RAG_TEST_BLANK"), None);
    }
}
