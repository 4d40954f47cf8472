//! Batch planning: group paragraphs or pages into synthesis batches.

pub mod planner;
pub mod tokens;

use serde::{Deserialize, Serialize};

use crate::config::BatchConfig;
use crate::extract::Document;
use crate::text::char_len;

pub use planner::{PlanUnit, plan_batches, units_from_pages, units_from_text};
pub use tokens::estimate_tokens;

/// What batch sizes are measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetUnit {
    Chars,
    Tokens,
}

impl BudgetUnit {
    pub fn measure(self) -> fn(&str) -> usize {
        match self {
            Self::Chars => char_len,
            Self::Tokens => estimate_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub target_size: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub unit: BudgetUnit,
}

/// One synthesis batch. Frozen once written to a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub index: usize,
    pub text: String,
    pub char_count: usize,
    pub token_estimate: usize,
    /// First and last source paragraph, 0-based
    pub paragraph_range: (usize, usize),
    /// First and last source page, when the input has pages
    #[serde(default)]
    pub page_range: Option<(usize, usize)>,
}

impl Batch {
    pub fn size(&self, unit: BudgetUnit) -> usize {
        match unit {
            BudgetUnit::Chars => self.char_count,
            BudgetUnit::Tokens => self.token_estimate,
        }
    }

    /// 1-based batch number used in artifact names.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

/// Plan a document, by page when it has pages and the config allows it.
pub fn plan_document(document: &Document, config: &BatchConfig) -> Vec<Batch> {
    let units = match (&document.pages, config.page_aware) {
        (Some(pages), true) if !pages.is_empty() => units_from_pages(pages),
        _ => units_from_text(&document.text),
    };
    plan_batches(units, &config.limits())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Page;

    #[test]
    fn test_batch_size_and_number() {
        let batch = Batch {
            index: 2,
            text: "text".into(),
            char_count: 4,
            token_estimate: 1,
            paragraph_range: (0, 0),
            page_range: None,
        };
        assert_eq!(batch.size(BudgetUnit::Chars), 4);
        assert_eq!(batch.size(BudgetUnit::Tokens), 1);
        assert_eq!(batch.number(), 3);
    }

    #[test]
    fn test_plan_document_uses_pages() {
        let document = Document {
            source_id: "doc".into(),
            text: "Alpha.\n\nBeta.".into(),
            pages: Some(vec![
                Page {
                    number: 1,
                    text: "Alpha.".into(),
                },
                Page {
                    number: 2,
                    text: "Beta.".into(),
                },
            ]),
        };
        let config = BatchConfig {
            unit: BudgetUnit::Chars,
            target_size: 100,
            min_size: 1,
            max_size: 200,
            ..BatchConfig::default()
        };
        let batches = plan_document(&document, &config);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].page_range, Some((1, 2)));

        let flat = plan_document(
            &document,
            &BatchConfig {
                page_aware: false,
                ..config
            },
        );
        assert_eq!(flat[0].page_range, None);
        assert_eq!(flat[0].text, batches[0].text);
    }
}
