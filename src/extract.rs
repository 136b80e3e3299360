//! Multi-format text extraction for uploaded documents (PDF, DOCX, TXT).
//!
//! Takes raw file bytes plus the declared extension and returns normalized
//! plain text. Extraction failures are fatal to that single file's
//! ingestion; no partial text is accepted.

use std::io::Read;

use crate::error::{PipelineError, Result};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection for DOCX archives).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extracts normalized plain text from file bytes, dispatching on the
/// declared extension (case-insensitive).
pub fn extract_text(bytes: &[u8], extension: &str) -> Result<String> {
    let raw = match extension.to_ascii_lowercase().as_str() {
        "pdf" => extract_pdf(bytes)?,
        "docx" => extract_docx(bytes)?,
        "txt" => extract_txt(bytes),
        other => return Err(PipelineError::UnsupportedFormat(other.to_string())),
    };
    Ok(normalize_text(&raw))
}

/// Collapses whitespace runs within lines to single spaces, drops blank
/// lines so newline runs collapse to one, and trims the ends.
pub fn normalize_text(raw: &str) -> String {
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| PipelineError::ExtractionFailed(e.to_string()))
}

fn extract_txt(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| PipelineError::ExtractionFailed(e.to_string()))?;
    let mut doc_xml = Vec::new();
    let mut found = false;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| PipelineError::ExtractionFailed(e.to_string()))?;
        if entry.name() == "word/document.xml" {
            entry
                .take(MAX_XML_ENTRY_BYTES)
                .read_to_end(&mut doc_xml)
                .map_err(|e| PipelineError::ExtractionFailed(e.to_string()))?;
            if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
                return Err(PipelineError::ExtractionFailed(
                    "word/document.xml exceeds size limit".to_string(),
                ));
            }
            found = true;
            break;
        }
    }
    if !found {
        return Err(PipelineError::ExtractionFailed(
            "word/document.xml not found".to_string(),
        ));
    }
    extract_w_t_elements(&doc_xml)
}

/// Pulls the text of every `w:t` run, separating paragraphs (`w:p`) with
/// newlines so normalization sees paragraph structure.
fn extract_w_t_elements(xml: &[u8]) -> Result<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && !out.ends_with('\n') && !out.is_empty() {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(PipelineError::ExtractionFailed(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extension_returns_error() {
        let err = extract_text(b"foo", "gif").unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
        assert_eq!(err.code(), "unsupported_format");
    }

    #[test]
    fn extension_matching_is_case_insensitive() {
        let text = extract_text(b"hello world", "TXT").unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn invalid_pdf_returns_extraction_failed() {
        let err = extract_text(b"not a pdf", "pdf").unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionFailed(_)));
    }

    #[test]
    fn invalid_zip_returns_extraction_failed_for_docx() {
        let err = extract_text(b"not a zip", "docx").unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionFailed(_)));
    }

    #[test]
    fn txt_is_read_and_normalized() {
        let text = extract_text(b"First  line.\r\n\r\n\r\nSecond\tline.\n", "txt").unwrap();
        assert_eq!(text, "First line.\nSecond line.");
    }

    #[test]
    fn normalize_collapses_whitespace_runs() {
        assert_eq!(normalize_text("a   b\t\tc"), "a b c");
    }

    #[test]
    fn normalize_collapses_newline_runs() {
        assert_eq!(normalize_text("a\n\n\n\nb"), "a\nb");
    }

    #[test]
    fn normalize_trims_ends() {
        assert_eq!(normalize_text("  \n  hello  \n  "), "hello");
    }

    #[test]
    fn normalize_empty_input_is_empty() {
        assert_eq!(normalize_text("   \n \t \n"), "");
    }
}
