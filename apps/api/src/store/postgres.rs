use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{FromRow, PgPool};
use tracing::debug;

use crate::models::chunk::{ChunkMetadata, NewChunk, ScoredChunk, StoredChunk};
use crate::store::{query_terms, ChunkStore, StoreError, StoreStats, VectorCandidate};

/// Chunk store on Postgres + pgvector.
///
/// `text_tsv` (GIN) serves lexical search, `file_name` (btree) serves per-file
/// lookups and the HNSW index on `embedding` serves nearest-neighbour queries.
#[derive(Clone)]
pub struct PgChunkStore {
    pool: PgPool,
}

impl PgChunkStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ChunkRow {
    id: i64,
    text: String,
    file_name: String,
    page_number: Option<i32>,
    chunk_number: i32,
    talent_id: Option<i64>,
    total_pages: i32,
    source_tag: String,
}

impl From<ChunkRow> for StoredChunk {
    fn from(row: ChunkRow) -> Self {
        StoredChunk {
            id: row.id,
            text: row.text,
            metadata: ChunkMetadata {
                file_name: row.file_name,
                page_number: row.page_number,
                chunk_number: row.chunk_number,
                talent_id: row.talent_id,
                total_pages: row.total_pages,
                source_tag: row.source_tag,
            },
        }
    }
}

#[derive(Debug, FromRow)]
struct ScoredRow {
    #[sqlx(flatten)]
    chunk: ChunkRow,
    score: f32,
}

#[derive(Debug, FromRow)]
struct CandidateRow {
    #[sqlx(flatten)]
    chunk: ChunkRow,
    embedding: Vector,
}

const CHUNK_COLUMNS: &str =
    "id, text, file_name, page_number, chunk_number, talent_id, total_pages, source_tag";

#[async_trait]
impl ChunkStore for PgChunkStore {
    async fn has_file(&self, file_name: &str) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM resume_chunks WHERE file_name = $1)")
                .bind(file_name)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn insert_document(&self, chunks: Vec<NewChunk>) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0usize;

        for chunk in chunks {
            let result = sqlx::query(
                r#"
                INSERT INTO resume_chunks
                    (text, file_name, page_number, chunk_number, talent_id,
                     total_pages, source_tag, embedding)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (file_name, chunk_number) DO NOTHING
                "#,
            )
            .bind(&chunk.text)
            .bind(&chunk.metadata.file_name)
            .bind(chunk.metadata.page_number)
            .bind(chunk.metadata.chunk_number)
            .bind(chunk.metadata.talent_id)
            .bind(chunk.metadata.total_pages)
            .bind(&chunk.metadata.source_tag)
            .bind(Vector::from(chunk.embedding))
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn text_search(
        &self,
        query: &str,
        limit: usize,
        file_filter: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        // Any-term semantics: each term is OR-ed into the tsquery. Terms are
        // alphanumeric only, so they are safe inside to_tsquery syntax.
        let terms = query_terms(query);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let tsquery = terms.join(" | ");
        debug!("Lexical search tsquery: {tsquery}");

        let sql = format!(
            r#"
            SELECT {CHUNK_COLUMNS},
                   ts_rank_cd(text_tsv, q)::float4 AS score
            FROM resume_chunks, to_tsquery('english', $1) AS q
            WHERE text_tsv @@ q
              AND ($2::text IS NULL OR file_name = $2)
            ORDER BY score DESC, id ASC
            LIMIT $3
            "#
        );
        let rows = sqlx::query_as::<_, ScoredRow>(&sql)
            .bind(&tsquery)
            .bind(file_filter)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| ScoredChunk {
                chunk: row.chunk.into(),
                score: row.score,
            })
            .collect())
    }

    async fn nearest(
        &self,
        embedding: &[f32],
        candidates: usize,
        file_filter: Option<&str>,
    ) -> Result<Vec<VectorCandidate>, StoreError> {
        if candidates == 0 {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            SELECT {CHUNK_COLUMNS}, embedding
            FROM resume_chunks
            WHERE ($2::text IS NULL OR file_name = $2)
            ORDER BY embedding <=> $1, id ASC
            LIMIT $3
            "#
        );
        let rows = sqlx::query_as::<_, CandidateRow>(&sql)
            .bind(Vector::from(embedding.to_vec()))
            .bind(file_filter)
            .bind(candidates as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| VectorCandidate {
                chunk: row.chunk.into(),
                embedding: row.embedding.to_vec(),
            })
            .collect())
    }

    async fn chunks_for_file(&self, file_name: &str) -> Result<Vec<StoredChunk>, StoreError> {
        let sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM resume_chunks WHERE file_name = $1 ORDER BY chunk_number"
        );
        let rows = sqlx::query_as::<_, ChunkRow>(&sql)
            .bind(file_name)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(StoredChunk::from).collect())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let (total, unique): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COUNT(DISTINCT file_name) FROM resume_chunks")
                .fetch_one(&self.pool)
                .await?;
        Ok(StoreStats {
            total_documents: total as u64,
            unique_source_files: unique as u64,
        })
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM resume_chunks")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
