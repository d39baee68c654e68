//! HTML text extraction: strips markup and script/style noise, keeping block-level
//! boundaries as paragraph breaks.

use crate::error::ExtractionError;
use scraper::{ElementRef, Html};

const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "nav", "header", "footer"];
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "section", "article",
];

pub fn extract_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let raw = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&raw);
    let mut out = String::new();
    collect_text(document.root_element(), &mut out, false);
    Ok(out)
}

/// Recursively walks element children, skipping text under `SKIP_TAGS` and
/// inserting a newline at each `BLOCK_TAGS` boundary so chunking sees paragraph breaks.
fn collect_text(element: ElementRef, out: &mut String, ancestor_skipped: bool) {
    let name = element.value().name();
    let skip = ancestor_skipped || SKIP_TAGS.contains(&name);
    if BLOCK_TAGS.contains(&name) {
        out.push('\n');
    }
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            collect_text(child_element, out, skip);
        } else if let Some(text) = child.value().as_text() {
            if !skip {
                out.push_str(text);
            }
        }
    }
}
