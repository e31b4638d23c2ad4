use lopdf::Document;
use tracing::{debug, warn};

use crate::{QaError, Result};

/// Text produced by a loader before splitting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    pub text: String,
    /// 1-based page number for paged formats
    pub page: Option<u32>,
}

/// Decode a plain text upload as a single document
#[inline]
pub fn load_text(content: &[u8]) -> Result<Vec<LoadedDocument>> {
    let text = std::str::from_utf8(content)
        .map_err(|e| QaError::Ingest(format!("Text file is not valid UTF-8: {}", e)))?;

    // A leading byte order mark is not part of the content
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    Ok(vec![LoadedDocument {
        text: text.to_string(),
        page: None,
    }])
}

/// Extract text from every page of a PDF, one document per page
#[inline]
pub fn load_pdf(content: &[u8]) -> Result<Vec<LoadedDocument>> {
    let document = Document::load_mem(content)
        .map_err(|e| QaError::Ingest(format!("Failed to load PDF: {}", e)))?;

    if document.is_encrypted() {
        return Err(QaError::Ingest(
            "PDF is encrypted and cannot be read".to_string(),
        ));
    }

    let pages = document.get_pages();
    debug!("PDF has {} pages", pages.len());

    let mut documents = Vec::with_capacity(pages.len());
    for page_number in pages.keys().copied() {
        match document.extract_text(&[page_number]) {
            Ok(text) if !text.trim().is_empty() => documents.push(LoadedDocument {
                text,
                page: Some(page_number),
            }),
            Ok(_) => debug!("Page {} has no text", page_number),
            Err(e) => warn!("Could not extract text from page {}: {}", page_number, e),
        }
    }

    if documents.is_empty() {
        return Err(QaError::Ingest(
            "PDF has no extractable text; it may be scanned or image-based".to_string(),
        ));
    }

    Ok(documents)
}
