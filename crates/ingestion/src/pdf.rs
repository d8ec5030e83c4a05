//! PDF text extraction
//!
//! Parsing is CPU-bound and must never run on the I/O scheduler: every
//! extraction is dispatched to the blocking pool behind a semaphore sized by
//! `job_max_workers`. Pages that yield no text are omitted.

use crate::errors::PdfError;
use lopdf::Document;
use metrics::histogram;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Extracted text of one page
pub type PageText = (u32, String);

pub struct PdfExtractor {
    permits: Arc<Semaphore>,
}

impl PdfExtractor {
    /// `max_workers` caps how many parses run concurrently process-wide
    pub fn new(max_workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }

    /// Extract page texts off the async scheduler
    pub async fn extract_pages(&self, bytes: Vec<u8>) -> Result<Vec<PageText>, PdfError> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PdfError::Malformed("worker pool closed".to_string()))?;

        let start = Instant::now();
        let result = tokio::task::spawn_blocking(move || extract_pages_sync(&bytes))
            .await
            .map_err(|e| PdfError::Malformed(format!("worker panicked: {}", e)))?;

        histogram!("fomentos_pdf_extraction_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        result
    }

    /// Full page-joined text with the page separator markers the extractor
    /// chunks over
    pub async fn extract_text(&self, bytes: Vec<u8>) -> Result<String, PdfError> {
        let pages = self.extract_pages(bytes).await?;
        Ok(join_pages(&pages))
    }
}

/// Concatenate pages with an explicit separator marker
pub fn join_pages(pages: &[PageText]) -> String {
    let mut text = String::new();
    for (page_no, page_text) in pages {
        text.push_str(&format!("\n--- Página {} ---\n", page_no));
        text.push_str(page_text);
        text.push('\n');
    }
    text
}

/// Blocking page walk over a loaded document
fn extract_pages_sync(bytes: &[u8]) -> Result<Vec<PageText>, PdfError> {
    let doc = Document::load_mem(bytes).map_err(|e| PdfError::Malformed(e.to_string()))?;

    if doc.is_encrypted() {
        return Err(PdfError::Encrypted);
    }

    let pages = doc.get_pages();
    debug!(page_count = pages.len(), "Extracting text from PDF");

    let mut result = Vec::new();
    for (page_no, page_id) in pages {
        let content = match doc.get_page_content(page_id) {
            Ok(content) => content,
            Err(e) => {
                warn!(page = page_no, error = %e, "Failed to read page content, skipping");
                continue;
            }
        };

        let text = page_text(&content);
        let trimmed = text.trim();
        // Empty pages are omitted, not returned as ""
        if !trimmed.is_empty() {
            result.push((page_no, trimmed.to_string()));
        }
    }

    if result.is_empty() {
        return Err(PdfError::EmptyExtraction);
    }

    Ok(result)
}

/// Operators that actually paint their string operands
fn shows_text(op: &str) -> bool {
    matches!(op, "Tj" | "TJ" | "'" | "\"")
}

/// Pull the shown text out of one page's content stream.
///
/// Government layout tools produce editais whose literals span lines, nest
/// balanced parentheses, and carry accented Portuguese as octal escapes, so
/// a line-oriented scan loses text. The stream is lexed instead: string
/// literals accumulate until the next operator token, which decides whether
/// they were shown text (Tj/TJ/'/") or operands of something else.
fn page_text(content: &[u8]) -> String {
    let stream: Vec<char> = String::from_utf8_lossy(content).chars().collect();
    let mut shown = String::new();
    let mut pending: Vec<String> = Vec::new();
    let mut i = 0;

    while i < stream.len() {
        match stream[i] {
            '(' => {
                i += 1;
                pending.push(read_string_literal(&stream, &mut i));
            }
            '<' => {
                // << opens a dictionary; <...> is a hex string. Neither is
                // text an edital reader wants
                if stream.get(i + 1) == Some(&'<') {
                    i += 2;
                } else {
                    i += 1;
                    while i < stream.len() && stream[i] != '>' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            '/' => {
                // Name token (/F1, /GS0); never an operator
                i += 1;
                while i < stream.len()
                    && !stream[i].is_whitespace()
                    && !matches!(stream[i], '(' | ')' | '<' | '>' | '[' | ']' | '/' | '%')
                {
                    i += 1;
                }
            }
            '%' => {
                while i < stream.len() && stream[i] != '\n' {
                    i += 1;
                }
            }
            '\'' | '"' => {
                flush_pending(&mut pending, &mut shown);
                i += 1;
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < stream.len()
                    && (stream[i].is_ascii_alphanumeric() || stream[i] == '*')
                {
                    i += 1;
                }
                let op: String = stream[start..i].iter().collect();
                if shows_text(&op) {
                    flush_pending(&mut pending, &mut shown);
                } else {
                    // The literals were operands of a non-text operator
                    pending.clear();
                }
            }
            _ => i += 1,
        }
    }

    shown
}

/// Append the accumulated literals as one run of shown text. TJ arrays
/// interleave kerning numbers between literals, so the pieces concatenate
/// without separators.
fn flush_pending(pending: &mut Vec<String>, shown: &mut String) {
    if pending.is_empty() {
        return;
    }
    for piece in pending.drain(..) {
        shown.push_str(&piece);
    }
    shown.push(' ');
}

/// Read a literal string, starting just past the opening parenthesis.
/// Handles nested balanced parens, the standard escapes, line
/// continuations, and octal codes (which Latin-encoded editais use for
/// every accented character).
fn read_string_literal(stream: &[char], i: &mut usize) -> String {
    let mut out = String::new();
    let mut depth = 1usize;

    while *i < stream.len() {
        let c = stream[*i];
        *i += 1;

        match c {
            '\\' => {
                let Some(&esc) = stream.get(*i) else { break };
                *i += 1;
                match esc {
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    'b' | 'f' => {}
                    '(' | ')' | '\\' => out.push(esc),
                    // Escaped newline is a line continuation, not content
                    '\n' => {}
                    '0'..='7' => {
                        let mut code = esc.to_digit(8).unwrap_or(0);
                        let mut digits = 1;
                        while digits < 3 {
                            match stream.get(*i).and_then(|d| d.to_digit(8)) {
                                Some(d) => {
                                    code = code * 8 + d;
                                    *i += 1;
                                    digits += 1;
                                }
                                None => break,
                            }
                        }
                        // 0x80..0xFF lines up with Latin-1, which is how
                        // ç/ã/é arrive in these documents
                        if let Some(ch) = char::from_u32(code) {
                            out.push(ch);
                        }
                    }
                    other => out.push(other),
                }
            }
            '(' => {
                depth += 1;
                out.push('(');
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
                out.push(')');
            }
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tj_literal() {
        let text = page_text(b"BT\n(Edital Universal) Tj\nET\n");
        assert_eq!(text, "Edital Universal ");
    }

    #[test]
    fn test_tj_array_concatenates_pieces() {
        let text = page_text(b"BT [(Pra) -12 (zo)] TJ ET");
        assert_eq!(text, "Prazo ");
    }

    #[test]
    fn test_nested_parentheses() {
        let text = page_text(b"BT (Chamada (CNPq) 10/2025) Tj ET");
        assert_eq!(text, "Chamada (CNPq) 10/2025 ");
    }

    #[test]
    fn test_octal_escapes_decode_accents() {
        // "Informa\347\343o" is how Latin-encoded PDFs spell "Informação"
        let text = page_text(b"BT (Informa\\347\\343o) Tj ET");
        assert_eq!(text, "Informa\u{e7}\u{e3}o ");
    }

    #[test]
    fn test_standard_escapes() {
        let text = page_text(b"BT (linha\\numa) Tj (par\\(ent\\)eses) Tj ET");
        assert!(text.contains("linha\numa"));
        assert!(text.contains("par(ent)eses"));
    }

    #[test]
    fn test_literal_spanning_lines() {
        let text = page_text(b"BT (primeira linha\nsegunda linha) Tj ET");
        assert!(text.contains("primeira linha"));
        assert!(text.contains("segunda linha"));
    }

    #[test]
    fn test_quote_operator_shows_text() {
        let text = page_text(b"BT (proxima linha) ' ET");
        assert_eq!(text, "proxima linha ");
    }

    #[test]
    fn test_non_text_operands_are_dropped() {
        // The first literal is consumed by a non-showing operator; only the
        // Tj literal is page text
        let text = page_text(b"(descartado) BX (Prazo final) Tj");
        assert_eq!(text, "Prazo final ");
    }

    #[test]
    fn test_hex_strings_and_names_are_skipped() {
        let text = page_text(b"BT /F1 12 Tf <4869> Tj (ola) Tj ET");
        assert_eq!(text, "ola ");
    }

    #[test]
    fn test_join_pages_has_separators() {
        let pages = vec![(1, "primeira".to_string()), (3, "terceira".to_string())];
        let joined = join_pages(&pages);
        assert!(joined.contains("--- Página 1 ---"));
        assert!(joined.contains("--- Página 3 ---"));
        assert!(!joined.contains("--- Página 2 ---"));
    }

    #[test]
    fn test_malformed_bytes_are_rejected() {
        let result = extract_pages_sync(b"isto nao e um pdf");
        assert!(matches!(result, Err(PdfError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_extractor_reports_malformed_async() {
        let extractor = PdfExtractor::new(2);
        let result = extractor.extract_text(b"garbage".to_vec()).await;
        assert!(matches!(result, Err(PdfError::Malformed(_))));
    }
}
