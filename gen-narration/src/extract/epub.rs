//! EPUB text extraction: spine documents in reading order become pages.

use std::path::Path;

use ::epub::doc::EpubDoc;

use super::{Page, TextExtractor};
use crate::error::{NarrationError, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct EpubExtractor;

impl EpubExtractor {
    fn spine_pages(&self, path: &Path) -> Result<Vec<Page>> {
        let mut doc = EpubDoc::new(path)
            .map_err(|e| NarrationError::extraction(path, format!("failed to open EPUB: {}", e)))?;

        let mut pages = Vec::new();
        let spine = doc.spine.clone();

        for spine_item in spine.iter() {
            if let Some((content_bytes, _mime)) = doc.get_resource(&spine_item.idref) {
                let html = String::from_utf8_lossy(&content_bytes).to_string();
                let plain_text = html_to_text(&html);

                // Skip cover pages and other empty documents
                if plain_text.trim().is_empty() {
                    continue;
                }

                pages.push(Page {
                    number: pages.len() + 1,
                    text: plain_text,
                });
            }
        }

        Ok(pages)
    }
}

impl TextExtractor for EpubExtractor {
    fn extract_text(&self, path: &Path) -> Result<String> {
        let pages = self.spine_pages(path)?;
        Ok(pages
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    fn extract_structured(&self, path: &Path) -> Result<Option<Vec<Page>>> {
        let pages = self.spine_pages(path)?;
        Ok(if pages.is_empty() { None } else { Some(pages) })
    }
}

/// Convert HTML to plain text
fn html_to_text(html: &str) -> String {
    let text = html2text::from_read(html.as_bytes(), 1000);
    tidy_lines(&text)
}

/// Join wrapped lines, keep paragraph breaks and decode leftover entities.
fn tidy_lines(text: &str) -> String {
    let mut result = String::new();
    let mut prev_was_break = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            if !prev_was_break && !result.is_empty() {
                result.push_str("\n\n");
                prev_was_break = true;
            }
            continue;
        }

        prev_was_break = false;
        if !result.is_empty() && !result.ends_with('\n') {
            result.push(' ');
        }
        result.push_str(trimmed);
    }

    result
        .trim_end()
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&hellip;", "...")
}
