//! Text processing for synthesis: cleaning, sentence splitting and chunking.

pub mod chunker;
pub mod cleaner;
pub mod sentences;

pub use chunker::{TextSegmenter, split_into_chunks};
pub use cleaner::clean_text;

/// A chunk of text ready for one engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position within its batch, 0-based
    pub index: usize,
    /// The text content
    pub text: String,
    /// Shorter than the configured minimum and could not be merged
    pub undersized: bool,
}

impl Chunk {
    pub fn new(index: usize, text: String) -> Self {
        Self {
            index,
            text,
            undersized: false,
        }
    }

    /// Length in Unicode scalar values.
    pub fn char_count(&self) -> usize {
        char_len(&self.text)
    }
}

/// Length in Unicode scalar values, the unit every text bound uses.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// CJK ideographs, kana and CJK punctuation.
pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3000..=0x303F     // CJK symbols and punctuation
        | 0x3040..=0x30FF   // Hiragana, Katakana
        | 0x3400..=0x4DBF   // Extension A
        | 0x4E00..=0x9FFF   // Unified ideographs
        | 0xF900..=0xFAFF   // Compatibility ideographs
        | 0xFF00..=0xFFEF   // Fullwidth forms
        | 0x20000..=0x2FA1F // Extensions B and later
    )
}

/// CJK ideograph proper, the unit the token estimate counts.
pub fn is_ideograph(c: char) -> bool {
    matches!(c as u32,
        0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0x20000..=0x2FA1F
    )
}

/// Sentence-terminal punctuation.
pub fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？' | '…')
}

/// Closing quotes and brackets that stay with the sentence they close.
pub fn is_closing(c: char) -> bool {
    matches!(
        c,
        '"' | '\'' | ')' | ']' | '}' | '」' | '』' | '）' | '》' | '〉' | '】' | '”' | '’'
    )
}

/// Secondary punctuation used to split over-long sentences.
pub fn is_secondary(c: char) -> bool {
    matches!(c, ',' | ';' | ':' | '，' | '；' | '：' | '、')
}

/// Separator placed between two joined pieces: nothing when either side of
/// the join is CJK, one space otherwise.
pub fn joiner(left: &str, right: &str) -> &'static str {
    match (left.chars().last(), right.chars().next()) {
        (Some(a), Some(b)) if is_cjk(a) || is_cjk(b) => "",
        (None, _) | (_, None) => "",
        _ => " ",
    }
}
