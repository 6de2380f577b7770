//! Fakes shared by unit and router tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::{Config, StoreBackend};
use crate::embedding::{Embedder, EmbeddingError};
use crate::identity::{IdentityRegistry, MemoryIdentityRegistry};
use crate::llm_client::{LanguageModel, LlmError};
use crate::models::identity::CandidateIdentity;
use crate::retrieval::RetrievalMode;
use crate::state::AppState;
use crate::store::{tokenize, MemoryChunkStore, StoreError};

/// Hashes each token into one of `DIMENSIONS` buckets and L2-normalises the
/// counts. Texts sharing words get a positive cosine similarity.
pub struct BagOfWordsEmbedder {
    failure_marker: Option<String>,
}

impl BagOfWordsEmbedder {
    pub const DIMENSIONS: usize = 256;

    pub fn new() -> Self {
        Self {
            failure_marker: None,
        }
    }

    /// Texts containing `marker` fail with a provider error.
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.failure_marker = Some(marker.to_string());
        self
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(marker) = &self.failure_marker {
            if text.contains(marker.as_str()) {
                return Err(EmbeddingError::Api {
                    status: 500,
                    message: "scripted embedding failure".to_string(),
                });
            }
        }

        let mut vector = vec![0.0f32; Self::DIMENSIONS];
        for token in tokenize(text) {
            vector[(fnv1a(&token) % Self::DIMENSIONS as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        Self::DIMENSIONS
    }
}

/// An embedder whose first attempt per call hangs for `attempt_timeout` and
/// gives up, then succeeds after a one second backoff. A whole `embed` call
/// therefore outlasts any single attempt.
pub struct RetryingEmbedder {
    inner: BagOfWordsEmbedder,
    attempt_timeout: Duration,
    attempts: AtomicUsize,
}

impl RetryingEmbedder {
    pub fn new(attempt_timeout: Duration) -> Self {
        Self {
            inner: BagOfWordsEmbedder::new(),
            attempt_timeout,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for RetryingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.attempt_timeout).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        BagOfWordsEmbedder::DIMENSIONS
    }
}

type Script = dyn Fn(&str, &str) -> Result<String, LlmError> + Send + Sync;

/// `LanguageModel` driven by a closure; counts how often it was called.
pub struct ScriptedModel {
    script: Box<Script>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn replying(answer: &str) -> Self {
        let answer = answer.to_string();
        Self::new(move |_, _| Ok(answer.clone()))
    }

    pub fn failing() -> Self {
        Self::new(|_, _| {
            Err(LlmError::Api {
                status: 500,
                message: "scripted failure".to_string(),
            })
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(prompt, system)
    }
}

/// Registry whose first insert loses a race to another writer: `find` misses
/// once, `insert_next` conflicts, and the existing row shows up afterwards.
pub struct ConflictOnceRegistry {
    existing: CandidateIdentity,
    finds: AtomicUsize,
    inserts: AtomicUsize,
}

impl ConflictOnceRegistry {
    pub fn with_existing(canonical_name: &str, talent_id: i64) -> Self {
        Self {
            existing: CandidateIdentity {
                talent_id,
                canonical_name: canonical_name.to_string(),
                created_at: Utc::now(),
            },
            finds: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
        }
    }

    pub fn insert_attempts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityRegistry for ConflictOnceRegistry {
    async fn find(&self, canonical_name: &str) -> Result<Option<CandidateIdentity>, StoreError> {
        let seen = self.finds.fetch_add(1, Ordering::SeqCst);
        if seen == 0 || canonical_name != self.existing.canonical_name {
            return Ok(None);
        }
        Ok(Some(self.existing.clone()))
    }

    async fn insert_next(&self, canonical_name: &str) -> Result<CandidateIdentity, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Conflict(format!(
            "talent identity '{canonical_name}'"
        )))
    }
}

pub fn test_config() -> Config {
    Config {
        store_backend: StoreBackend::Memory,
        database_url: None,
        anthropic_api_key: "test-anthropic-key".to_string(),
        embedding_api_key: "test-embedding-key".to_string(),
        embedding_base_url: "https://example.invalid/v1".to_string(),
        embedding_model: "test-embedding".to_string(),
        embedding_dimensions: BagOfWordsEmbedder::DIMENSIONS,
        resume_folder: "cv".to_string(),
        s3: None,
        chunk_size: 500,
        retrieval_limit: 5,
        vector_candidates: 10,
        retrieval_mode: RetrievalMode::Vector,
        embed_concurrency: 5,
        external_timeout_secs: 5,
        port: 0,
        rust_log: "debug".to_string(),
    }
}

/// State on memory backends with the bag-of-words embedder and `llm`.
pub fn test_state(llm: ScriptedModel) -> AppState {
    test_state_with(test_config(), Arc::new(llm))
}

pub fn test_state_with(config: Config, llm: Arc<dyn LanguageModel>) -> AppState {
    AppState::new(
        config,
        Arc::new(MemoryChunkStore::new()),
        Arc::new(MemoryIdentityRegistry::new()),
        Arc::new(BagOfWordsEmbedder::new()),
        llm,
        None,
    )
}

/// Builds a minimal, valid PDF with one Helvetica text line per page.
/// Page text must be plain ASCII without parentheses or backslashes.
pub fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let page_count = pages.len();
    // 1 catalog, 2 pages, 3 font, then (page, content) pairs from 4.
    let kids = (0..page_count)
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{kids}] /Count {page_count} >>"),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    ];
    for (i, text) in pages.iter().enumerate() {
        let content_id = 5 + 2 * i;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {content_id} 0 R >>"
        ));
        let stream = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        objects.push(format!(
            "<< /Length {} >>\nstream\n{stream}\nendstream",
            stream.len()
        ));
    }

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }

    let xref_start = pdf.len();
    let mut trailer = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        trailer.push_str(&format!("{offset:010} 00000 n \n"));
    }
    trailer.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_start}\n%%EOF\n",
        objects.len() + 1
    ));
    pdf.extend_from_slice(trailer.as_bytes());
    pdf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bag_of_words_is_normalised() {
        let embedder = BagOfWordsEmbedder::new();
        let v = embedder.embed("rust rust go").await.unwrap();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(v.len(), BagOfWordsEmbedder::DIMENSIONS);
    }

    #[test]
    fn test_build_pdf_has_header_and_trailer() {
        let pdf = build_pdf(&["one", "two"]);
        let text = String::from_utf8(pdf).unwrap();
        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.contains("/Count 2"));
        assert!(text.trim_end().ends_with("%%EOF"));
    }
}
