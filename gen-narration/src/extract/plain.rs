use std::fs;
use std::path::Path;

use super::{Page, TextExtractor};
use crate::error::{NarrationError, Result};

const FORM_FEED: char = '\u{000c}';

/// Plain text and markdown. Form feeds separate pages, as `pdftotext`
/// writes them.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    fn read(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).map_err(|e| NarrationError::extraction(path, e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String> {
        self.read(path)
    }

    fn extract_structured(&self, path: &Path) -> Result<Option<Vec<Page>>> {
        let text = self.read(path)?;
        Ok(split_pages(&text))
    }
}

/// Pages numbered by position, blank pages dropped. `None` without any
/// form feed.
pub fn split_pages(text: &str) -> Option<Vec<Page>> {
    if !text.contains(FORM_FEED) {
        return None;
    }
    let pages = text
        .split(FORM_FEED)
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| Page {
            number: i + 1,
            text: page.to_string(),
        })
        .collect();
    Some(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_pages() {
        let pages = split_pages("one\u{000c}\u{000c}three\u{000c}").unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[1].number, 3);
        assert_eq!(pages[1].text, "three");
        assert!(split_pages("no pages").is_none());
    }

    #[test]
    fn test_extract_lossy_utf8() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.txt");
        fs::write(&path, b"caf\xe9 ok").unwrap();
        let text = PlainTextExtractor.extract_text(&path).unwrap();
        assert!(text.ends_with(" ok"));
    }

    #[test]
    fn test_extract_missing_file() {
        let err = PlainTextExtractor
            .extract_text(Path::new("/nonexistent/input.txt"))
            .unwrap_err();
        assert!(matches!(err, NarrationError::Extraction { .. }));
    }

    #[test]
    fn test_extract_structured_from_pdftotext_output() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("book.txt");
        fs::write(&path, "Page one.\u{000c}Page two.").unwrap();
        let pages = PlainTextExtractor.extract_structured(&path).unwrap().unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].text, "Page two.");
    }
}
