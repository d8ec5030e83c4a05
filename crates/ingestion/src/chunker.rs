//! Fixed-size overlapping chunker
//!
//! Chunk `i` covers characters `[i*(size-overlap), i*(size-overlap)+size)`,
//! right-trimmed to the text length. The same chunk list feeds both the LLM
//! extraction and the vector index, so indices stay coherent between them.

#[derive(Clone, Copy, Debug)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 3000,
            chunk_overlap: 300,
        }
    }
}

impl ChunkingConfig {
    fn stride(&self) -> usize {
        if self.chunk_overlap < self.chunk_size {
            self.chunk_size - self.chunk_overlap
        } else {
            // Degenerate configuration; still make progress
            self.chunk_size.max(1)
        }
    }
}

/// Split text into whitespace-trimmed overlapping chunks.
/// Operates on characters, not bytes, so multi-byte Portuguese text never
/// splits inside a code point.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    if total == 0 {
        return Vec::new();
    }

    let stride = config.stride();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let end = (start + config.chunk_size).min(total);
        let chunk: String = chars[start..end].iter().collect();
        chunks.push(chunk.trim().to_string());
        start += stride;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", &ChunkingConfig::default()).is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunk_text("  edital curto  ", &ChunkingConfig::default());
        assert_eq!(chunks, vec!["edital curto".to_string()]);
    }

    #[test]
    fn test_chunk_arithmetic() {
        let text = "a".repeat(7000);
        let config = ChunkingConfig {
            chunk_size: 3000,
            chunk_overlap: 300,
        };
        let chunks = chunk_text(&text, &config);

        // Starts at 0, 2700, 5400 — three chunks
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 3000);
        assert_eq!(chunks[1].len(), 3000);
        assert_eq!(chunks[2].len(), 7000 - 5400);
    }

    #[test]
    fn test_round_trip_covers_full_input() {
        // Concatenating all chunks with the overlap stripped reproduces the
        // original text
        let text: String = ('a'..='z').cycle().take(10_000).collect();
        let config = ChunkingConfig {
            chunk_size: 1200,
            chunk_overlap: 200,
        };
        let stride = 1000;

        let chunks = chunk_text(&text, &config);

        let mut reconstructed = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i + 1 < chunks.len() {
                reconstructed.push_str(&chunk.chars().take(stride).collect::<String>());
            } else {
                reconstructed.push_str(chunk);
            }
        }

        assert_eq!(reconstructed, text);
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text: String = ('a'..='z').cycle().take(5000).collect();
        let config = ChunkingConfig {
            chunk_size: 1200,
            chunk_overlap: 200,
        };
        let chunks = chunk_text(&text, &config);

        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().skip(1000).collect();
            assert!(pair[1].starts_with(&tail));
        }
    }

    #[test]
    fn test_multibyte_text_never_panics() {
        let text = "ação pública de fomento à inovação çãõé ".repeat(200);
        let config = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 30,
        };
        let chunks = chunk_text(&text, &config);
        assert!(!chunks.is_empty());
    }
}
