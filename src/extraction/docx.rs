//! DOCX text extraction: a DOCX is a zip archive; the visible text lives in
//! `word/document.xml` as a sequence of `<w:t>` runs.

use crate::error::ExtractionError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};

pub fn extract_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let cursor = Cursor::new(bytes);
    let mut archive =
        zip::ZipArchive::new(cursor).map_err(|e| ExtractionError::Corrupt(e.to_string()))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractionError::UnsupportedFormat("missing word/document.xml".to_string()))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractionError::Corrupt(e.to_string()))?;

    extract_runs(&xml)
}

/// Walks the XML event stream, concatenating `<w:t>` run text and inserting a
/// newline at each paragraph (`<w:p>`) close so chunking sees paragraph breaks.
fn extract_runs(xml: &str) -> Result<String, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut out = String::new();
    let mut in_text_run = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text_run = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"t" => in_text_run = false,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"p" => out.push('\n'),
            Ok(Event::Text(t)) if in_text_run => {
                let text = t
                    .unescape()
                    .map_err(|e| ExtractionError::Corrupt(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractionError::Corrupt(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}
