//! PDF bytes to ordered, fixed-size text chunks.
//!
//! Splitting is a pure character window (no sentence or word awareness).
//! Pages without extractable text are skipped; the chunk counter runs across
//! the whole document and is never reset per page.

use serde::Serialize;
use thiserror::Error;

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The bytes could not be decoded as a PDF at all.
    #[error("failed to parse {file_name}: {reason}")]
    DocumentParse { file_name: String, reason: String },
}

/// One chunk of extracted text with its provenance inside the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageChunk {
    /// 1-based page the chunk came from.
    pub page_number: u32,
    /// 1-based, contiguous across the document.
    pub chunk_number: u32,
    pub chunk_text: String,
}

#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub file_name: String,
    pub total_pages: usize,
    pub chunks: Vec<PageChunk>,
}

impl ExtractedDocument {
    /// Concatenation of all chunks in chunk order, i.e. the text of every page
    /// that yielded any.
    pub fn full_text(&self) -> String {
        self.chunks.iter().map(|c| c.chunk_text.as_str()).collect()
    }
}

/// Extracts and chunks a PDF.
///
/// PDF decoding is CPU-bound and the decoder may panic on hostile input, so it
/// runs on the blocking pool; a panic is reported as a parse failure.
pub async fn extract(
    file_bytes: bytes::Bytes,
    file_name: &str,
    chunk_size: usize,
) -> Result<ExtractedDocument, ExtractError> {
    let parse_error = |reason: String| ExtractError::DocumentParse {
        file_name: file_name.to_string(),
        reason,
    };

    let pages = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem_by_pages(&file_bytes)
    })
    .await
    .map_err(|e| parse_error(format!("PDF decoder aborted: {e}")))?
    .map_err(|e| parse_error(e.to_string()))?;

    Ok(ExtractedDocument {
        file_name: file_name.to_string(),
        total_pages: pages.len(),
        chunks: chunk_pages(&pages, chunk_size),
    })
}

/// Turns per-page text into numbered chunks, skipping blank pages.
pub fn chunk_pages<S: AsRef<str>>(pages: &[S], chunk_size: usize) -> Vec<PageChunk> {
    let mut chunks = Vec::new();
    let mut chunk_number = 1u32;

    for (index, page) in pages.iter().enumerate() {
        let text = page.as_ref();
        if text.trim().is_empty() {
            continue;
        }
        for window in split_into_windows(text, chunk_size) {
            chunks.push(PageChunk {
                page_number: index as u32 + 1,
                chunk_number,
                chunk_text: window.to_string(),
            });
            chunk_number += 1;
        }
    }

    chunks
}

/// Splits `text` into consecutive windows of `chunk_size` characters (not
/// bytes). The last window may be shorter. A zero size is treated as 1.
pub fn split_into_windows(text: &str, chunk_size: usize) -> Vec<&str> {
    let size = chunk_size.max(1);
    let mut windows = Vec::with_capacity(text.len() / size + 1);
    let mut start = 0usize;
    let mut count = 0usize;

    for (idx, _) in text.char_indices() {
        if count == size {
            windows.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        windows.push(&text[start..]);
    }
    windows
}
