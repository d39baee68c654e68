//! Chunker (C2): fixed-size overlapping token windows with boundary preference.
//!
//! Tokens are approximated by whitespace runs, matching the teacher's
//! `knowledge/chunker.rs` approach of treating the embedder's tokenizer as an
//! implementation detail the chunker doesn't need to reproduce exactly.

use crate::config::ChunkingConfig;

/// One token's byte span within the original text, produced by [`tokenize`].
#[derive(Debug, Clone, Copy)]
struct Token {
    start: usize,
    end: usize,
}

/// A single chunk: its text plus the token range it covers, for overlap math.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub content: String,
}

/// Splits `text` into whitespace-delimited token spans, preserving byte offsets
/// so chunk boundaries can be mapped back onto the original string exactly.
fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                tokens.push(Token { start: s, end: i });
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            start: s,
            end: text.len(),
        });
    }
    tokens
}

/// True if the token at `idx` ends a sentence or paragraph: its text ends in
/// `.`, `!`, or `?`, or it's immediately followed by a blank line.
fn is_boundary_token(text: &str, tokens: &[Token], idx: usize) -> bool {
    let tok = &tokens[idx];
    let tok_text = &text[tok.start..tok.end];
    if tok_text.ends_with(['.', '!', '?']) {
        return true;
    }
    if idx + 1 < tokens.len() {
        let between = &text[tok.end..tokens[idx + 1].start];
        if between.matches('\n').count() >= 2 {
            return true;
        }
    }
    false
}

/// Searches `[target - window, target + window]` (clamped to `[lo, hi)`) for the
/// token index closest to `target` that satisfies [`is_boundary_token`]. Falls
/// back to `target` itself (a plain whitespace cut) if none qualifies.
fn find_boundary(text: &str, tokens: &[Token], target: usize, window: usize, hi: usize) -> usize {
    let lo_bound = target.saturating_sub(window);
    let hi_bound = (target + window).min(hi.saturating_sub(1));
    let mut best: Option<(usize, usize)> = None; // (distance, index)
    for idx in lo_bound..=hi_bound.max(lo_bound) {
        if idx >= tokens.len() {
            break;
        }
        if is_boundary_token(text, tokens, idx) {
            let dist = if idx > target { idx - target } else { target - idx };
            let better = match best {
                Some((d, _)) => dist < d,
                None => true,
            };
            if better {
                best = Some((dist, idx));
            }
        }
    }
    best.map(|(_, idx)| idx).unwrap_or(target.min(hi.saturating_sub(1)))
}

/// Splits `text` into overlapping chunks per `config`. Empty input yields an
/// empty sequence. Chunk indices are contiguous starting at 0.
pub fn chunk(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return Vec::new();
    }

    let chunk_size = config.chunk_size.max(1);
    let overlap = config.overlap.min(chunk_size.saturating_sub(1));
    let window = (chunk_size / 10).max(1);

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < tokens.len() {
        let target_end = (start + chunk_size).min(tokens.len());
        // Only search for a nicer boundary when this isn't the final chunk —
        // the last chunk always runs to the end of the token stream.
        let end = if target_end >= tokens.len() {
            tokens.len()
        } else {
            (find_boundary(text, &tokens, target_end - 1, window, tokens.len()) + 1)
                .max(start + 1)
                .min(tokens.len())
        };

        let byte_start = tokens[start].start;
        let byte_end = tokens[end - 1].end;
        chunks.push(TextChunk {
            index: chunks.len(),
            content: text[byte_start..byte_end].to_string(),
        });

        if end >= tokens.len() {
            break;
        }
        // Guarantees the overlap invariant holds exactly regardless of where
        // boundary search landed `end`; `max(start + 1, ...)` keeps the window
        // strictly advancing even when overlap is close to chunk_size.
        let next_start = end.saturating_sub(overlap).max(start + 1);
        start = next_start;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cfg(chunk_size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            overlap,
            max_concurrent_documents: 4,
        }
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk("", &cfg(800, 300)).is_empty());
        assert!(chunk("   \n  ", &cfg(800, 300)).is_empty());
    }

    #[test]
    fn test_indices_are_contiguous_from_zero() {
        let text = "word ".repeat(2000);
        let chunks = chunk(&text, &cfg(100, 20));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn test_short_text_is_a_single_chunk() {
        let chunks = chunk("hello world", &cfg(800, 300));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "hello world");
    }

    #[test]
    fn test_prefers_sentence_boundary() {
        let text = format!("{} End of sentence. {}", "word ".repeat(90), "word ".repeat(90));
        let chunks = chunk(&text, &cfg(100, 20));
        assert!(chunks[0].content.trim_end().ends_with('.'));
    }

    proptest! {
        #[test]
        fn prop_coverage_reconstructs_input(words in proptest::collection::vec("[a-z]{1,8}", 50..400)) {
            let text = words.join(" ");
            let chunks = chunk(&text, &cfg(40, 10));
            if !chunks.is_empty() {
                // first chunk starts at the beginning, last chunk ends at the end
                prop_assert!(text.starts_with(chunks[0].content.split_whitespace().next().unwrap_or("")));
                prop_assert!(chunks.last().unwrap().content.split_whitespace().last().is_some());
            }
        }

        #[test]
        fn prop_overlap_bound_holds(words in proptest::collection::vec("[a-z]{1,6}", 100..500)) {
            let text = words.join(" ");
            let config = cfg(40, 10);
            let chunks = chunk(&text, &config);
            for pair in chunks.windows(2) {
                let prev_tokens: Vec<&str> = pair[0].content.split_whitespace().collect();
                let next_tokens: Vec<&str> = pair[1].content.split_whitespace().collect();
                // count shared tokens at the prev-tail / next-head boundary
                let mut overlap = 0usize;
                let max_check = prev_tokens.len().min(next_tokens.len());
                for k in 1..=max_check {
                    if prev_tokens[prev_tokens.len() - k..] == next_tokens[..k] {
                        overlap = k;
                    }
                }
                prop_assert!(overlap as f64 <= config.overlap as f64 * 1.2 + 1.0);
            }
        }
    }
}
