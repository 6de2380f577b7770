//! Identity resolution: maps a resume to a stable numeric talent id.
//!
//! Flow: NameExtractor (LLM) → canonicalise → registry lookup → insert on miss.
//! An unresolved identity is a degraded, non-fatal result: the document is
//! still indexed, with `talent_id = None`.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::llm_client::LlmError;
use crate::models::identity::CandidateIdentity;
use crate::store::StoreError;

pub mod extractor;
pub mod prompts;
pub mod registry;

pub use extractor::{LlmNameExtractor, NameExtractor};
pub use registry::{IdentityRegistry, MemoryIdentityRegistry, PgIdentityRegistry};

use prompts::UNKNOWN_NAME;

/// Attempts at insert-or-reread before giving up on a contended name.
const MAX_RESOLVE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("name extraction failed: {0}")]
    Extraction(#[from] LlmError),

    #[error("name extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("no name could be determined")]
    UnknownName,

    #[error("identity registry error: {0}")]
    Registry(#[from] StoreError),

    #[error("identity for '{0}' stayed contended after {MAX_RESOLVE_ATTEMPTS} attempts")]
    Contended(String),
}

/// Canonical deduplication key for a name: lowercase, only alphanumerics and
/// single spaces. Returns `None` for blank names and the "unknown" sentinel.
pub fn canonicalize_name(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    let canonical = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if canonical.is_empty() || canonical == UNKNOWN_NAME {
        None
    } else {
        Some(canonical)
    }
}

pub struct IdentityResolver {
    extractor: Arc<dyn NameExtractor>,
    registry: Arc<dyn IdentityRegistry>,
    timeout: Duration,
}

impl IdentityResolver {
    pub fn new(
        extractor: Arc<dyn NameExtractor>,
        registry: Arc<dyn IdentityRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            extractor,
            registry,
            timeout,
        }
    }

    /// Resolves the identity behind `full_document_text`, or `None` when it
    /// cannot be determined. Failures are logged for manual follow-up and
    /// never propagate.
    pub async fn resolve_identity(&self, full_document_text: &str) -> Option<CandidateIdentity> {
        match self.try_resolve(full_document_text).await {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!("Identity left unresolved: {e}");
                None
            }
        }
    }

    pub async fn try_resolve(
        &self,
        full_document_text: &str,
    ) -> Result<CandidateIdentity, IdentityError> {
        let raw_name = tokio::time::timeout(
            self.timeout,
            self.extractor.extract_name(full_document_text),
        )
        .await
        .map_err(|_| IdentityError::Timeout(self.timeout))??;

        let canonical = canonicalize_name(&raw_name).ok_or(IdentityError::UnknownName)?;
        self.get_or_create(&canonical).await
    }

    /// Lookup, insert on miss; a uniqueness conflict means another writer got
    /// there first, so the row is re-read instead of failing.
    pub async fn get_or_create(&self, canonical: &str) -> Result<CandidateIdentity, IdentityError> {
        for _ in 0..MAX_RESOLVE_ATTEMPTS {
            if let Some(existing) = self.registry.find(canonical).await? {
                return Ok(existing);
            }
            match self.registry.insert_next(canonical).await {
                Ok(created) => {
                    debug!(
                        "Registered talent {} for '{}'",
                        created.talent_id, created.canonical_name
                    );
                    return Ok(created);
                }
                Err(StoreError::Conflict(what)) => {
                    debug!("Conflict inserting {what}; re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(IdentityError::Contended(canonical.to_string()))
    }
}
