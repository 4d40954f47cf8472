use once_cell::sync::Lazy;
use regex::Regex;

use crate::text::is_ideograph;

static ASCII_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z]+").expect("valid word regex"));

/// Rough token count for budgeting batches.
///
/// Heuristic only, not any model's tokenizer: each CJK ideograph counts as
/// one token and each run of ASCII letters as 1.3 tokens, rounded down over
/// the whole text.
pub fn estimate_tokens(text: &str) -> usize {
    let ideographs = text.chars().filter(|c| is_ideograph(*c)).count();
    let words = ASCII_WORD.find_iter(text).count();
    ideographs + words * 13 / 10
}
