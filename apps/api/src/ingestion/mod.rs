//! Batch ingestion: list a source, then extract, resolve and index each PDF.
//!
//! Runs inline on the ingest endpoints or as a background job. At most one
//! ingestion (or store reset) runs at a time; queries are never blocked.

pub mod handlers;
pub mod indexer;
pub mod jobs;
pub mod pipeline;
pub mod sources;
