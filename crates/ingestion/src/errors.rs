//! Ingestion error types

use fomentos_common::errors::AppError;
use thiserror::Error;

/// Failure modes of the polite HTTP fetcher
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("protocol error fetching {url}: {message}")]
    Protocol { url: String, message: String },

    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("response too large for {url}: {size} bytes")]
    TooLarge { url: String, size: usize },
}

impl From<FetchError> for AppError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Timeout { url } => AppError::FetchTimeout { url },
            FetchError::Protocol { url, message } => AppError::FetchProtocol { url, message },
            FetchError::HttpStatus { url, status } => AppError::FetchHttpStatus { url, status },
            FetchError::TooLarge { url, size } => AppError::FetchTooLarge { url, size },
        }
    }
}

/// Failure modes of PDF text extraction.
/// `EmptyExtraction` is a per-edital failure, never a pipeline failure.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("malformed PDF: {0}")]
    Malformed(String),

    #[error("PDF is encrypted")]
    Encrypted,

    #[error("no extractable text")]
    EmptyExtraction,
}

impl From<PdfError> for AppError {
    fn from(e: PdfError) -> Self {
        match e {
            PdfError::Malformed(message) => AppError::MalformedPdf { message },
            PdfError::Encrypted => AppError::EncryptedPdf,
            PdfError::EmptyExtraction => AppError::EmptyExtraction,
        }
    }
}
