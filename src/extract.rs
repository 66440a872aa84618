//! Text extraction for binary source documents.
//!
//! Extraction is a pipeline-layer boundary: the ingestion pipeline supplies
//! bytes and a content type; an extractor returns plain UTF-8 text. The
//! [`TextExtractor`] trait lets tests and custom binaries swap in their own
//! implementation.

use std::path::Path;
use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";

/// Extraction error. Extraction never panics; the pipeline counts the file
/// as failed and moves on.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("text decoding failed: {0}")]
    Text(String),
}

/// Turns raw document bytes into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractError>;
}

/// Default extractor: PDF via `pdf-extract`, plain text passed through.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
        extract_text(bytes, content_type)
    }
}

/// Extracts plain text from binary content.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match content_type {
        MIME_PDF => extract_pdf(bytes),
        MIME_TEXT => String::from_utf8(bytes.to_vec()).map_err(|e| ExtractError::Text(e.to_string())),
        _ => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Guess a content type from a file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => MIME_PDF,
        Some("txt") | Some("md") => MIME_TEXT,
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_text(b"foo", "application/octet-stream").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = PdfTextExtractor.extract(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn plain_text_passes_through() {
        let text = extract_text("Scope of Work".as_bytes(), MIME_TEXT).unwrap();
        assert_eq!(text, "Scope of Work");
    }

    #[test]
    fn content_type_from_extension() {
        assert_eq!(content_type_for(Path::new("a/rfp.PDF")), MIME_PDF);
        assert_eq!(content_type_for(Path::new("notes.txt")), MIME_TEXT);
        assert_eq!(
            content_type_for(Path::new("archive.zip")),
            "application/octet-stream"
        );
    }
}
