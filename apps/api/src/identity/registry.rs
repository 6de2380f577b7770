use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::models::identity::CandidateIdentity;
use crate::store::StoreError;

/// Postgres SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Append-only registry of canonical candidate identities.
///
/// `insert_next` must be backed by a uniqueness constraint on the canonical
/// name and report a violation as `StoreError::Conflict`; the resolver turns
/// that into a re-read instead of failing.
#[async_trait]
pub trait IdentityRegistry: Send + Sync {
    async fn find(&self, canonical_name: &str) -> Result<Option<CandidateIdentity>, StoreError>;

    /// Inserts `canonical_name` with `max(talent_id) + 1` (or 1 when empty).
    async fn insert_next(&self, canonical_name: &str) -> Result<CandidateIdentity, StoreError>;
}

#[derive(Clone)]
pub struct PgIdentityRegistry {
    pool: PgPool,
}

impl PgIdentityRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRegistry for PgIdentityRegistry {
    async fn find(&self, canonical_name: &str) -> Result<Option<CandidateIdentity>, StoreError> {
        Ok(sqlx::query_as::<_, CandidateIdentity>(
            "SELECT talent_id, canonical_name, created_at FROM talent_identities WHERE canonical_name = $1",
        )
        .bind(canonical_name)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_next(&self, canonical_name: &str) -> Result<CandidateIdentity, StoreError> {
        let inserted = sqlx::query_as::<_, CandidateIdentity>(
            r#"
            INSERT INTO talent_identities (talent_id, canonical_name)
            SELECT COALESCE(MAX(talent_id), 0) + 1, $1 FROM talent_identities
            RETURNING talent_id, canonical_name, created_at
            "#,
        )
        .bind(canonical_name)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(identity) => Ok(identity),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                Err(StoreError::Conflict(format!("talent identity '{canonical_name}'")))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process registry with the same uniqueness semantics as the table.
#[derive(Default)]
pub struct MemoryIdentityRegistry {
    identities: RwLock<Vec<CandidateIdentity>>,
}

impl MemoryIdentityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.identities.read().await.len()
    }
}

#[async_trait]
impl IdentityRegistry for MemoryIdentityRegistry {
    async fn find(&self, canonical_name: &str) -> Result<Option<CandidateIdentity>, StoreError> {
        let identities = self.identities.read().await;
        Ok(identities
            .iter()
            .find(|i| i.canonical_name == canonical_name)
            .cloned())
    }

    async fn insert_next(&self, canonical_name: &str) -> Result<CandidateIdentity, StoreError> {
        let mut identities = self.identities.write().await;
        if identities.iter().any(|i| i.canonical_name == canonical_name) {
            return Err(StoreError::Conflict(format!(
                "talent identity '{canonical_name}'"
            )));
        }
        let talent_id = identities.iter().map(|i| i.talent_id).max().unwrap_or(0) + 1;
        let identity = CandidateIdentity {
            talent_id,
            canonical_name: canonical_name.to_string(),
            created_at: Utc::now(),
        };
        identities.push(identity.clone());
        Ok(identity)
    }
}
