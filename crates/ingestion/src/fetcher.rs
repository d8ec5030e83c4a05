//! Polite HTTP fetcher
//!
//! One shared connection pool for every scraper. Retries transient network
//! failures with a linear backoff ladder (2s base for timeouts, 3s base for
//! protocol errors), follows redirects, and applies the PDF detection
//! heuristic to downloaded artifacts.

use crate::errors::FetchError;
use metrics::counter;
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed User-Agent presented to every site
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Hard cap on downloaded artifacts
const MAX_RESPONSE_BYTES: usize = 50 * 1024 * 1024;

/// Per-call fetch options
#[derive(Clone, Debug)]
pub struct FetchOptions {
    /// Expect (and detect) a PDF artifact
    pub accept_pdf: bool,
    /// Attempts including the first one
    pub max_retries: u32,
    /// Total per-request timeout
    pub read_timeout: Duration,
}

impl FetchOptions {
    /// Listing pages: short timeout, HTML expected
    pub fn listing() -> Self {
        Self {
            accept_pdf: false,
            max_retries: 3,
            read_timeout: Duration::from_secs(30),
        }
    }

    /// PDF downloads: generous timeout, artifact expected
    pub fn pdf() -> Self {
        Self {
            accept_pdf: true,
            max_retries: 3,
            read_timeout: Duration::from_secs(120),
        }
    }
}

/// A fetched artifact
#[derive(Clone, Debug)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub final_url: String,
    /// Result of the PDF detection heuristic
    pub is_pdf: bool,
}

impl Fetched {
    /// Response body decoded as text (listing pages)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self { client })
    }

    /// GET with retries. Safe to call from many tasks in parallel; the
    /// connection pool is shared.
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<Fetched, FetchError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            counter!("fomentos_fetch_requests_total").increment(1);

            match self.fetch_once(url, options).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) => {
                    let (retryable, backoff_base) = match &e {
                        FetchError::Timeout { .. } => (true, 2u64),
                        FetchError::Protocol { .. } => (true, 3u64),
                        FetchError::HttpStatus { .. } | FetchError::TooLarge { .. } => (false, 0),
                    };

                    if !retryable || attempt >= options.max_retries {
                        return Err(e);
                    }

                    let wait = Duration::from_secs(backoff_base * attempt as u64);
                    warn!(
                        url,
                        attempt,
                        max_retries = options.max_retries,
                        wait_secs = wait.as_secs(),
                        error = %e,
                        "Fetch failed, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    async fn fetch_once(&self, url: &str, options: &FetchOptions) -> Result<Fetched, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(options.read_timeout)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if let Some(length) = response.content_length() {
            if length as usize > MAX_RESPONSE_BYTES {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    size: length as usize,
                });
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify(url, e))?
            .to_vec();

        if bytes.len() > MAX_RESPONSE_BYTES {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                size: bytes.len(),
            });
        }

        let is_pdf = detect_pdf(&content_type, &final_url, &bytes);
        debug!(
            url,
            final_url = %final_url,
            size = bytes.len(),
            content_type = %content_type,
            is_pdf,
            "Fetched"
        );

        Ok(Fetched {
            bytes,
            content_type,
            final_url,
            is_pdf,
        })
    }
}

fn classify(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() || e.is_connect() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        // Peer resets, truncated bodies, invalid frames
        FetchError::Protocol {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

/// PDF detection heuristic: content-type, URL shape, or magic bytes.
/// Sites frequently serve PDFs behind "download" links with a wrong
/// content-type, so any one signal is enough.
pub fn detect_pdf(content_type: &str, url: &str, bytes: &[u8]) -> bool {
    if content_type.contains("application/pdf") {
        return true;
    }

    let path = url.to_lowercase();
    if path.contains(".pdf") || path.contains("-pdf") || path.contains("download") {
        return true;
    }

    bytes.len() >= 4 && &bytes[..4] == b"%PDF"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_content_type() {
        assert!(detect_pdf(
            "application/pdf; charset=binary",
            "https://example.org/arquivo",
            b"anything"
        ));
    }

    #[test]
    fn test_detect_by_url_shape() {
        assert!(detect_pdf("text/html", "https://example.org/edital.PDF", b""));
        assert!(detect_pdf(
            "text/html",
            "https://www.gov.br/capes/chamada-10-2025-pdf",
            b""
        ));
        assert!(detect_pdf(
            "application/octet-stream",
            "https://confap.org.br/editais/download?id=42",
            b""
        ));
    }

    #[test]
    fn test_detect_by_magic_bytes_despite_wrong_content_type() {
        assert!(detect_pdf(
            "text/html",
            "https://example.org/ver",
            b"%PDF-1.7 rest of file"
        ));
    }

    #[test]
    fn test_non_pdf_is_untouched() {
        assert!(!detect_pdf(
            "text/html; charset=utf-8",
            "https://example.org/pagina",
            b"<html><body>ola</body></html>"
        ));
    }
}
