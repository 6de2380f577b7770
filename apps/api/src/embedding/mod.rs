//! Text embedding behind the `Embedder` trait.
//!
//! Chunks and queries are embedded with the same call; the provider decides
//! dimensionality, and the store keeps it constant.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod http;
pub use http::HttpEmbedder;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("embedding response malformed: {0}")]
    Malformed(String),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    Dimensions { expected: usize, actual: usize },

    #[error("embedding call timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds one piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Length of every vector returned by `embed`.
    fn dimensions(&self) -> usize;
}
