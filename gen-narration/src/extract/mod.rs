//! Document text extraction.

pub mod epub;
pub mod plain;

use std::path::Path;

use log::debug;

use crate::error::{NarrationError, Result};

pub use self::epub::EpubExtractor;
pub use self::plain::PlainTextExtractor;

/// One physical page (or spine document) of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number
    pub number: usize,
    pub text: String,
}

/// Extracted input, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File stem, used for job keys and artifact names
    pub source_id: String,
    pub text: String,
    pub pages: Option<Vec<Page>>,
}

/// Source of document text.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, path: &Path) -> Result<String>;

    /// Ordered pages, when the format has them.
    fn extract_structured(&self, _path: &Path) -> Result<Option<Vec<Page>>> {
        Ok(None)
    }
}

/// Pick an extractor from the file extension.
pub fn extractor_for(path: &Path) -> Result<Box<dyn TextExtractor>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "epub" => Ok(Box::new(EpubExtractor)),
        "" | "txt" | "text" | "md" | "markdown" => Ok(Box::new(PlainTextExtractor)),
        other => Err(NarrationError::extraction(
            path,
            format!(
                "unsupported input type '.{}' (convert it to text first, e.g. with pdftotext)",
                other
            ),
        )),
    }
}

/// Identifier derived from the file stem.
pub fn source_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

/// Extract a document with the extractor matching its extension.
pub fn open_document(path: &Path) -> Result<Document> {
    let extractor = extractor_for(path)?;
    load_document(extractor.as_ref(), path)
}

/// Extract a document with a given extractor. Empty text is an error.
pub fn load_document(extractor: &dyn TextExtractor, path: &Path) -> Result<Document> {
    let text = extractor.extract_text(path)?;
    if text.trim().is_empty() {
        return Err(NarrationError::extraction(path, "no extractable text"));
    }
    let pages = extractor.extract_structured(path)?;

    debug!(
        "Extracted {} chars ({} pages) from {}",
        text.chars().count(),
        pages.as_ref().map(|p| p.len()).unwrap_or(0),
        path.display()
    );

    Ok(Document {
        source_id: source_id(path),
        text,
        pages,
    })
}
