//! PDF text extraction, gated behind the `pdf` feature.

use crate::error::ExtractionError;

/// Extracts plain text from PDF bytes via `pdf_extract`, falling back to a
/// `lopdf`-based page walk when the high-level extractor chokes on a
/// malformed content stream.
pub fn extract_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) => Ok(text),
        Err(_) => extract_text_via_lopdf(bytes),
    }
}

fn extract_text_via_lopdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| {
        if e.to_string().to_lowercase().contains("encrypt") {
            ExtractionError::Encrypted
        } else {
            ExtractionError::Corrupt(e.to_string())
        }
    })?;

    let mut text = String::new();
    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(_) => continue,
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_are_corrupt_not_panic() {
        let err = extract_text(b"not a pdf at all").unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::Corrupt(_) | ExtractionError::Encrypted
        ));
    }
}
