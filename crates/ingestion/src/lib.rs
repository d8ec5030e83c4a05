//! Fomentos ingestion pipeline
//!
//! Discovery (per-agency source adapters) → fetch → PDF text extraction →
//! progressive chunked LLM extraction → canonical store + vector index,
//! driven by a cron-scheduled, cancellable job orchestrator.

pub mod chunker;
pub mod errors;
pub mod extractor;
pub mod fetcher;
pub mod jobs;
pub mod pdf;
pub mod processor;
pub mod sources;

pub use errors::{FetchError, PdfError};
pub use fetcher::HttpFetcher;
pub use jobs::JobOrchestrator;
pub use pdf::PdfExtractor;
