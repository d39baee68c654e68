//! Text extraction (C1): turns raw file bytes into plain text plus a content hash.
//!
//! Format dispatch is by extension; each format lives in its own submodule so the
//! `pdf` feature can be compiled out without touching the others.

mod docx;
mod html;
#[cfg(feature = "pdf")]
mod pdf;

use crate::error::{ExtractionError, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Extracted plain text plus its content hash, ready for chunking.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub content_hash: String,
}

/// Dispatches on file extension and extracts plain text from `bytes`.
///
/// Returns `ExtractionError::UnsupportedFormat` for unrecognized extensions,
/// `ExtractionError::NoText` when extraction succeeds but yields no usable text
/// (e.g. a scanned, image-only PDF).
pub fn extract(path: &Path, bytes: &[u8]) -> Result<ExtractedText> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let raw = match ext.as_str() {
        #[cfg(feature = "pdf")]
        "pdf" => pdf::extract_text(bytes)?,
        #[cfg(not(feature = "pdf"))]
        "pdf" => {
            return Err(ExtractionError::UnsupportedFormat(
                "pdf support not compiled in (enable the `pdf` feature)".to_string(),
            )
            .into())
        }
        "docx" => docx::extract_text(bytes)?,
        "html" | "htm" => html::extract_text(bytes)?,
        "txt" | "md" => String::from_utf8(bytes.to_vec())
            .map_err(|e| ExtractionError::Unreadable(e.to_string()))?,
        other => return Err(ExtractionError::UnsupportedFormat(other.to_string()).into()),
    };

    let text = normalize_whitespace(&raw);
    if text.trim().is_empty() {
        return Err(ExtractionError::NoText.into());
    }

    let content_hash = hash_content(&text);
    Ok(ExtractedText { text, content_hash })
}

/// Collapses runs of whitespace introduced by extraction (page breaks, stray
/// hyphenation, repeated blank lines, repeated interior spaces/tabs) without
/// touching paragraph boundaries.
fn normalize_whitespace(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0usize;
    for line in raw.lines() {
        let trimmed = line.trim_end();
        if trimmed.trim().is_empty() {
            blank_run += 1;
            if blank_run <= 1 {
                out.push('\n');
            }
        } else {
            blank_run = 0;
            let mut words = trimmed.split_whitespace();
            if let Some(first) = words.next() {
                out.push_str(first);
                for word in words {
                    out.push(' ');
                    out.push_str(word);
                }
            }
            out.push('\n');
        }
    }
    out
}

fn hash_content(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_extension_rejected() {
        let err = extract(Path::new("file.xyz"), b"hello").unwrap_err();
        assert!(matches!(
            err,
            crate::error::AgentError::Extraction(ExtractionError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_txt_roundtrip() {
        let result = extract(Path::new("notes.txt"), b"hello world").unwrap();
        assert_eq!(result.text.trim(), "hello world");
        assert_eq!(result.content_hash.len(), 64);
    }

    #[test]
    fn test_blank_input_is_no_text() {
        let err = extract(Path::new("empty.txt"), b"   \n\n  ").unwrap_err();
        assert!(matches!(
            err,
            crate::error::AgentError::Extraction(ExtractionError::NoText)
        ));
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = extract(Path::new("a.txt"), b"same content").unwrap();
        let b = extract(Path::new("b.txt"), b"same content").unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_collapses_repeated_blank_lines() {
        let result = extract(Path::new("x.txt"), b"para one\n\n\n\n\npara two").unwrap();
        assert!(!result.text.contains("\n\n\n"));
    }

    #[test]
    fn test_collapses_interior_whitespace_runs() {
        let result = extract(Path::new("x.txt"), b"word1    word2\t\tword3").unwrap();
        assert_eq!(result.text.trim(), "word1 word2 word3");
    }
}
