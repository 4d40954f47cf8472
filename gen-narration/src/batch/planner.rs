use log::debug;

use super::{Batch, PlanLimits, estimate_tokens};
use crate::extract::Page;
use crate::text::chunker::pack_pieces;
use crate::text::sentences::{split_paragraphs, split_sentences};
use crate::text::{char_len, clean_text};

/// A paragraph (or piece of one) with its position in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanUnit {
    pub text: String,
    pub paragraph: usize,
    pub page: Option<usize>,
}

/// One unit per paragraph of the cleaned text.
pub fn units_from_text(text: &str) -> Vec<PlanUnit> {
    let cleaned = clean_text(text);
    split_paragraphs(&cleaned)
        .into_iter()
        .enumerate()
        .map(|(paragraph, text)| PlanUnit {
            text: text.to_string(),
            paragraph,
            page: None,
        })
        .collect()
}

/// One unit per paragraph, tagged with its page. Paragraph numbers run
/// across pages.
pub fn units_from_pages(pages: &[Page]) -> Vec<PlanUnit> {
    let mut units = Vec::new();
    for page in pages {
        let cleaned = clean_text(&page.text);
        for text in split_paragraphs(&cleaned) {
            units.push(PlanUnit {
                text: text.to_string(),
                paragraph: units.len(),
                page: Some(page.number),
            });
        }
    }
    units
}

struct Group {
    units: Vec<PlanUnit>,
    size: usize,
}

/// Group units into batches of roughly `target_size`.
///
/// Units accumulate until the next one would push the batch past
/// `target_size`. A unit bigger than `max_size` is split by sentence first.
/// A final pass folds batches under `min_size` into their predecessor (the
/// first batch into its successor) when the result stays within `max_size`.
pub fn plan_batches(units: Vec<PlanUnit>, limits: &PlanLimits) -> Vec<Batch> {
    let measure = limits.unit.measure();

    let mut groups: Vec<Group> = Vec::new();
    let mut current = Group {
        units: Vec::new(),
        size: 0,
    };

    for unit in split_oversized(units, limits.max_size, measure) {
        let size = measure(&unit.text);
        if !current.units.is_empty() && current.size + size > limits.target_size {
            groups.push(std::mem::replace(
                &mut current,
                Group {
                    units: Vec::new(),
                    size: 0,
                },
            ));
        }
        current.units.push(unit);
        current.size += size;
    }
    if !current.units.is_empty() {
        groups.push(current);
    }

    let before = groups.len();
    let merged = merge_small(groups, limits.min_size, limits.max_size);
    debug!(
        "Planned {} batches ({} before merging), target {} {:?}",
        merged.len(),
        before,
        limits.target_size,
        limits.unit
    );

    merged
        .into_iter()
        .enumerate()
        .map(|(index, group)| build_batch(index, group.units))
        .collect()
}

fn split_oversized(
    units: Vec<PlanUnit>,
    max_size: usize,
    measure: fn(&str) -> usize,
) -> Vec<PlanUnit> {
    let mut out = Vec::with_capacity(units.len());
    for unit in units {
        if measure(&unit.text) <= max_size {
            out.push(unit);
            continue;
        }
        let pieces = pack_pieces(split_sentences(&unit.text), max_size, measure);
        debug!(
            "Paragraph {} exceeds {} and was split into {} pieces",
            unit.paragraph,
            max_size,
            pieces.len()
        );
        out.extend(pieces.into_iter().map(|text| PlanUnit {
            text,
            paragraph: unit.paragraph,
            page: unit.page,
        }));
    }
    out
}

fn merge_small(groups: Vec<Group>, min_size: usize, max_size: usize) -> Vec<Group> {
    let mut merged: Vec<Group> = Vec::with_capacity(groups.len());

    for group in groups {
        let only_one = merged.len() == 1;
        if let Some(prev) = merged.last_mut() {
            let first_is_small = only_one && prev.size < min_size;
            if (group.size < min_size || first_is_small) && prev.size + group.size <= max_size {
                prev.size += group.size;
                prev.units.extend(group.units);
                continue;
            }
        }
        merged.push(group);
    }

    merged
}

fn build_batch(index: usize, units: Vec<PlanUnit>) -> Batch {
    let char_count = units.iter().map(|u| char_len(&u.text)).sum();
    let token_estimate = units.iter().map(|u| estimate_tokens(&u.text)).sum();
    let first_paragraph = units.first().map(|u| u.paragraph).unwrap_or(0);
    let last_paragraph = units.last().map(|u| u.paragraph).unwrap_or(0);
    let pages: Vec<usize> = units.iter().filter_map(|u| u.page).collect();
    let page_range = match (pages.iter().min(), pages.iter().max()) {
        (Some(first), Some(last)) => Some((*first, *last)),
        _ => None,
    };
    let text = units
        .into_iter()
        .map(|u| u.text)
        .collect::<Vec<_>>()
        .join("\n\n");

    Batch {
        index,
        text,
        char_count,
        token_estimate,
        paragraph_range: (first_paragraph, last_paragraph),
        page_range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BudgetUnit;

    fn limits(target: usize, min: usize, max: usize) -> PlanLimits {
        PlanLimits {
            target_size: target,
            min_size: min,
            max_size: max,
            unit: BudgetUnit::Chars,
        }
    }

    fn paragraphs(count: usize, len: usize) -> Vec<PlanUnit> {
        (0..count)
            .map(|i| PlanUnit {
                text: char::from(b'a' + i as u8).to_string().repeat(len),
                paragraph: i,
                page: None,
            })
            .collect()
    }

    #[test]
    fn test_plan_five_paragraphs_keeps_tail() {
        let batches = plan_batches(paragraphs(5, 1000), &limits(2500, 500, 3000));
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].paragraph_range, (0, 1));
        assert_eq!(batches[1].paragraph_range, (2, 3));
        assert_eq!(batches[2].paragraph_range, (4, 4));
        assert_eq!(batches[0].char_count, 2000);
        assert_eq!(batches[2].index, 2);
    }

    #[test]
    fn test_plan_five_paragraphs_merges_tail() {
        let batches = plan_batches(paragraphs(5, 1000), &limits(2500, 1500, 3000));
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].paragraph_range, (0, 1));
        assert_eq!(batches[1].paragraph_range, (2, 4));
        assert_eq!(batches[1].char_count, 3000);
    }

    #[test]
    fn test_plan_joins_units_with_blank_line() {
        let batches = plan_batches(paragraphs(2, 3), &limits(100, 1, 100));
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].text, "aaa\n\nbbb");
        assert_eq!(batches[0].char_count, 6);
    }

    #[test]
    fn test_plan_first_batch_merges_forward() {
        let mut units = paragraphs(1, 100);
        units.extend(
            paragraphs(3, 1000)
                .into_iter()
                .enumerate()
                .map(|(i, u)| PlanUnit {
                    paragraph: i + 1,
                    ..u
                }),
        );
        // The 100-char opening would otherwise stand alone below the minimum
        let batches = plan_batches(units, &limits(1000, 500, 1200));
        assert_eq!(batches[0].paragraph_range, (0, 1));
        assert_eq!(batches[0].char_count, 1100);
        assert_eq!(batches.len(), 3);
    }

    #[test]
    fn test_plan_small_batch_kept_when_merge_too_big() {
        let mut units = paragraphs(1, 1000);
        units.push(PlanUnit {
            text: "tail".into(),
            paragraph: 1,
            page: None,
        });
        let batches = plan_batches(units, &limits(1000, 500, 1002));
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].text, "tail");
    }

    #[test]
    fn test_plan_splits_oversized_paragraph() {
        let sentence = format!("{}.", "word ".repeat(39).trim_end());
        let paragraph = vec![sentence.as_str(); 10].join(" ");
        let units = vec![PlanUnit {
            text: paragraph,
            paragraph: 7,
            page: Some(3),
        }];
        let batches = plan_batches(units, &limits(500, 100, 600));
        assert!(batches.len() > 1);
        for batch in &batches {
            assert!(batch.char_count <= 600);
            assert_eq!(batch.paragraph_range, (7, 7));
            assert_eq!(batch.page_range, Some((3, 3)));
        }
    }

    #[test]
    fn test_plan_by_tokens() {
        let units = vec![
            PlanUnit {
                text: "one two three four five six seven eight nine ten".into(),
                paragraph: 0,
                page: None,
            },
            PlanUnit {
                text: "一二三四五六七八九十".into(),
                paragraph: 1,
                page: None,
            },
        ];
        let limits = PlanLimits {
            unit: BudgetUnit::Tokens,
            ..limits(15, 1, 30)
        };
        let batches = plan_batches(units, &limits);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].token_estimate, 13);
        assert_eq!(batches[1].token_estimate, 10);
    }

    #[test]
    fn test_plan_token_slices_stay_within_max() {
        let units = vec![PlanUnit {
            text: "a我".repeat(100),
            paragraph: 0,
            page: None,
        }];
        let limits = PlanLimits {
            unit: BudgetUnit::Tokens,
            ..limits(50, 1, 50)
        };
        let batches = plan_batches(units, &limits);
        assert!(batches.len() > 4);
        for batch in &batches {
            assert!(batch.token_estimate <= 50, "batch {} has {}", batch.index, batch.token_estimate);
        }
    }

    #[test]
    fn test_units_from_pages_numbers_paragraphs_across_pages() {
        let pages = vec![
            Page {
                number: 1,
                text: "First.\n\nSecond.".into(),
            },
            Page {
                number: 2,
                text: "Third.".into(),
            },
        ];
        let units = units_from_pages(&pages);
        assert_eq!(units.len(), 3);
        assert_eq!(units[2].paragraph, 2);
        assert_eq!(units[2].page, Some(2));
    }

    #[test]
    fn test_units_from_text() {
        let units = units_from_text("One.\n\n\n  Two.  \n");
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].text, "Two.");
        assert!(plan_batches(Vec::new(), &limits(10, 1, 20)).is_empty());
    }
}
