use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row of the append-only identity registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CandidateIdentity {
    pub talent_id: i64,
    pub canonical_name: String,
    pub created_at: DateTime<Utc>,
}
