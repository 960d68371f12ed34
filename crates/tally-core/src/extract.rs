//! Text extraction from statement documents
//!
//! Only documents with an embedded text layer are supported; scanned images
//! produce no text and fail extraction.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};

/// Converts a stored document into plain text
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, document: &[u8]) -> Result<String>;
}

/// PDF text-layer extraction via `pdf-extract`
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, document: &[u8]) -> Result<String> {
        if document.is_empty() {
            return Err(Error::Extraction("Document is empty".into()));
        }

        let bytes = document.to_vec();
        // pdf-extract is CPU-bound and can panic on malformed input
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| Error::Extraction(format!("PDF reader aborted: {}", e)))?
            .map_err(|e| Error::Extraction(e.to_string()))?;

        let text = normalize_text(&text);
        if text.is_empty() {
            return Err(Error::Extraction(
                "No text layer found (scanned statements are not supported)".into(),
            ));
        }

        debug!(chars = text.len(), "Extracted statement text");
        Ok(text)
    }
}

/// Collapse page breaks and blank runs into plain newline-separated lines
pub fn normalize_text(raw: &str) -> String {
    raw.split(['\n', '\u{000C}'])
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_document_fails() {
        let result = PdfTextExtractor::new().extract(b"").await;
        assert!(matches!(result, Err(Error::Extraction(_))));
    }

    #[tokio::test]
    async fn test_non_pdf_bytes_fail() {
        let result = PdfTextExtractor::new()
            .extract(b"this is definitely not a pdf")
            .await;
        assert!(matches!(result, Err(Error::Extraction(_))));
    }

    #[test]
    fn test_normalize_text_drops_blank_lines_and_page_breaks() {
        let raw = "ACME BANK\n\n  \n01/15 WALMART 42.10   \n\u{000C}Page 2\n";
        assert_eq!(normalize_text(raw), "ACME BANK\n01/15 WALMART 42.10\nPage 2");
    }

    #[test]
    fn test_normalize_text_whitespace_only_is_empty() {
        assert!(normalize_text(" \n\t\n\u{000C}").is_empty());
    }
}
