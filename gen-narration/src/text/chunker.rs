//! Bounded-length chunking for synthesis.

use log::{debug, warn};

use super::cleaner::{clean_text, insert_rhythm_markers, normalize_numbers, normalize_punctuation};
use super::sentences::{split_clauses, split_paragraphs, split_sentences};
use super::{Chunk, char_len, joiner};
use crate::config::SegmentConfig;

/// Split text into chunks of `min_chars..=max_chars` characters.
///
/// The text is cleaned, split into sentences and packed greedily. Sentences
/// longer than `max_chars` are split at secondary punctuation and, failing
/// that, sliced at `max_chars`. A short chunk is merged into its predecessor
/// when the result still fits; otherwise it is kept and, unless it is the
/// last chunk, flagged `undersized`.
pub fn split_into_chunks(text: &str, min_chars: usize, max_chars: usize) -> Vec<Chunk> {
    chunk_cleaned(&clean_text(text), min_chars, max_chars)
}

/// Segmenter carrying the rewrite toggles and bounds of a [`SegmentConfig`].
#[derive(Debug, Clone)]
pub struct TextSegmenter {
    config: SegmentConfig,
}

impl TextSegmenter {
    pub fn new(config: SegmentConfig) -> Self {
        Self { config }
    }

    /// Clean and apply the enabled rewrites.
    pub fn prepare(&self, text: &str) -> String {
        let mut prepared = clean_text(text);
        if self.config.normalize_numbers {
            prepared = normalize_numbers(&prepared);
        }
        if self.config.normalize_punctuation {
            prepared = normalize_punctuation(&prepared);
        }
        if self.config.rhythm_markers {
            prepared = insert_rhythm_markers(&prepared, &self.config.pause_marker);
        }
        prepared
    }

    pub fn segment(&self, text: &str) -> Vec<Chunk> {
        let prepared = self.prepare(text);
        chunk_cleaned(&prepared, self.config.min_chars, self.config.max_chars)
    }
}

fn chunk_cleaned(text: &str, min_chars: usize, max_chars: usize) -> Vec<Chunk> {
    if text.trim().is_empty() || max_chars == 0 {
        return Vec::new();
    }

    let sentences: Vec<String> = split_paragraphs(text)
        .into_iter()
        .flat_map(split_sentences)
        .collect();

    let packed = pack_pieces(sentences, max_chars, char_len);
    let merged = merge_short(packed, min_chars, max_chars);

    let last = merged.len().saturating_sub(1);
    let chunks: Vec<Chunk> = merged
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let mut chunk = Chunk::new(index, text);
            if index != last && chunk.char_count() < min_chars {
                warn!(
                    "Chunk {} has {} chars, below the {} minimum",
                    index,
                    chunk.char_count(),
                    min_chars
                );
                chunk.undersized = true;
            }
            chunk
        })
        .collect();

    debug!(
        "Segmented {} chars into {} chunks (bounds {}..={})",
        char_len(text),
        chunks.len(),
        min_chars,
        max_chars
    );
    chunks
}

/// Greedily pack pieces into strings whose `measure` stays within `max`.
///
/// Joiners count toward the length. Pieces over the bound are split at
/// secondary punctuation, then force-sliced so each slice's `measure` fits
/// `max`.
pub(crate) fn pack_pieces(
    pieces: Vec<String>,
    max: usize,
    measure: fn(&str) -> usize,
) -> Vec<String> {
    pack_level(pieces, max, measure, true)
}

fn pack_level(
    pieces: Vec<String>,
    max: usize,
    measure: fn(&str) -> usize,
    split_clauses_first: bool,
) -> Vec<String> {
    let mut packed = Vec::new();
    let mut current = String::new();

    for piece in pieces {
        let len = measure(&piece);

        if len > max {
            flush(&mut packed, &mut current);
            let clauses = if split_clauses_first {
                split_clauses(&piece)
            } else {
                Vec::new()
            };
            if clauses.len() > 1 {
                packed.extend(pack_level(clauses, max, measure, false));
            } else {
                packed.extend(force_slice(&piece, max, measure));
            }
            continue;
        }

        if current.is_empty() {
            current = piece;
            continue;
        }

        // Measure the joined text; token estimates are not additive
        let candidate = format!("{}{}{}", current, joiner(&current, &piece), piece);
        if measure(&candidate) <= max {
            current = candidate;
        } else {
            flush(&mut packed, &mut current);
            current = piece;
        }
    }

    flush(&mut packed, &mut current);
    packed
}

fn flush(packed: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        packed.push(std::mem::take(current));
    }
}

/// Slice at character positions (last resort). A slice is cut back one
/// character at a time until its `measure` fits `max`, so in character mode
/// every slice but the last holds exactly `max` characters.
pub(crate) fn force_slice(text: &str, max: usize, measure: fn(&str) -> usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let max = max.max(1);
    let mut slices = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + max).min(chars.len());
        let mut slice: String = chars[start..end].iter().collect();
        while end > start + 1 && measure(slice.trim()) > max {
            end -= 1;
            slice = chars[start..end].iter().collect();
        }

        let trimmed = slice.trim();
        if !trimmed.is_empty() {
            slices.push(trimmed.to_string());
        }
        start = end;
    }
    slices
}

/// Merge each chunk under `min_chars` into its predecessor when it fits.
fn merge_short(packed: Vec<String>, min_chars: usize, max_chars: usize) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(packed.len());

    for chunk in packed {
        let len = char_len(&chunk);
        if len < min_chars {
            if let Some(prev) = merged.last_mut() {
                let sep = joiner(prev, &chunk);
                if char_len(prev) + char_len(sep) + len <= max_chars {
                    prev.push_str(sep);
                    prev.push_str(&chunk);
                    continue;
                }
            }
        }
        merged.push(chunk);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::estimate_tokens;
    use proptest::prelude::*;

    fn texts(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    fn non_whitespace(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_chunk_short_text() {
        let chunks = split_into_chunks("Hello world. How are you?", 5, 280);
        assert_eq!(texts(&chunks), vec!["Hello world. How are you?"]);
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn test_chunk_empty_text() {
        assert!(split_into_chunks("", 10, 100).is_empty());
        assert!(split_into_chunks("   \n\n   ", 10, 100).is_empty());
    }

    #[test]
    fn test_chunk_just_under_max_is_single() {
        let text = format!("{}.", "a".repeat(98));
        let chunks = split_into_chunks(&text, 10, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].char_count(), 99);
    }

    #[test]
    fn test_chunk_force_slices_without_punctuation() {
        let text = "x".repeat(300);
        let chunks = split_into_chunks(&text, 50, 100);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.char_count() == 100));
    }

    #[test]
    fn test_chunk_greedy_packing() {
        let text = "First sentence. Second sentence. Third sentence. Fourth sentence.";
        let chunks = split_into_chunks(text, 10, 35);
        assert_eq!(
            texts(&chunks),
            vec!["First sentence. Second sentence.", "Third sentence. Fourth sentence."]
        );
    }

    #[test]
    fn test_chunk_long_sentence_splits_on_commas() {
        let text = "alpha beta gamma, delta epsilon zeta, eta theta iota, kappa lambda mu.";
        let chunks = split_into_chunks(text, 1, 40);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.char_count() <= 40));
        assert!(chunks[0].text.ends_with(','));
    }

    #[test]
    fn test_chunk_merges_short_tail() {
        let text = "This sentence is exactly long. Tiny.";
        let chunks = split_into_chunks(text, 10, 40);
        assert_eq!(texts(&chunks), vec!["This sentence is exactly long. Tiny."]);
    }

    #[test]
    fn test_chunk_flags_unmergeable_short_chunk() {
        // "Ok." cannot merge into the full first chunk and is not last
        let first = format!("{}.", "a".repeat(29));
        let text = format!("{} Ok. {}.", first, "b".repeat(29));
        let chunks = split_into_chunks(&text, 10, 30);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].undersized);
        assert_eq!(chunks[1].text, "Ok.");
        assert!(!chunks[2].undersized);
    }

    #[test]
    fn test_chunk_cjk_joins_without_space() {
        let text = "今天天气很好。我们去公园吧。";
        let chunks = split_into_chunks(text, 1, 100);
        assert_eq!(texts(&chunks), vec!["今天天气很好。我们去公园吧。"]);
    }

    #[test]
    fn test_chunk_spans_paragraphs() {
        let text = "One short paragraph.\n\nAnother short one.";
        let chunks = split_into_chunks(text, 1, 100);
        assert_eq!(texts(&chunks), vec!["One short paragraph. Another short one."]);
    }

    #[test]
    fn test_segmenter_applies_rewrites() {
        let config = SegmentConfig {
            min_chars: 1,
            max_chars: 100,
            normalize_numbers: true,
            normalize_punctuation: true,
            rhythm_markers: false,
            ..SegmentConfig::default()
        };
        let segmenter = TextSegmenter::new(config);
        let chunks = segmenter.segment("二〇二四 年 ends here");
        assert_eq!(texts(&chunks), vec!["2024年 ends here."]);
    }

    #[test]
    fn test_force_slice() {
        assert_eq!(
            force_slice("abcdefghij", 3, char_len),
            vec!["abc", "def", "ghi", "j"]
        );
    }

    #[test]
    fn test_force_slice_fits_token_measure() {
        // Each "a我" pair estimates above one token per character
        let text = "a我".repeat(100);
        let slices = force_slice(&text, 50, estimate_tokens);
        assert!(slices.len() > 4);
        for slice in &slices {
            assert!(estimate_tokens(slice) <= 50, "{} tokens", estimate_tokens(slice));
        }
        assert_eq!(slices.concat(), text);
    }

    #[test]
    fn test_pack_pieces_measures_joined_text() {
        // Five one-word pieces estimate 1 each but 6 once joined
        let pieces = vec!["a".to_string(); 5];
        let packed = pack_pieces(pieces, 5, estimate_tokens);
        for piece in &packed {
            assert!(estimate_tokens(piece) <= 5);
        }
        assert_eq!(packed.iter().map(|p| p.split(' ').count()).sum::<usize>(), 5);
    }

    proptest! {
        #[test]
        fn prop_chunks_respect_max(text in "[a-z ,.!?\n你好。，]{0,600}") {
            let chunks = split_into_chunks(&text, 20, 60);
            for chunk in &chunks {
                prop_assert!(chunk.char_count() <= 60);
            }
        }

        #[test]
        fn prop_chunking_is_deterministic(text in "[a-zA-Z ,;.!?\n]{0,400}") {
            prop_assert_eq!(split_into_chunks(&text, 15, 50), split_into_chunks(&text, 15, 50));
        }

        #[test]
        fn prop_chunking_preserves_content(text in "[a-z ,.!?\n你好。]{0,600}") {
            let chunks = split_into_chunks(&text, 20, 60);
            let joined: String = chunks.iter().map(|c| non_whitespace(&c.text)).collect();
            prop_assert_eq!(joined, non_whitespace(&clean_text(&text)));
        }

        #[test]
        fn prop_only_inner_chunks_are_flagged(text in "[a-z .!?\n]{0,500}") {
            let chunks = split_into_chunks(&text, 25, 60);
            if let Some(last) = chunks.last() {
                prop_assert!(!last.undersized);
            }
            for chunk in &chunks {
                if chunk.undersized {
                    prop_assert!(chunk.char_count() < 25);
                }
            }
        }
    }
}
