//! Text cleaning and optional narration rewrites.

use once_cell::sync::Lazy;
use regex::Regex;

use super::is_cjk;

/// Characters that trip up synthesis engines and their replacements.
const PROBLEMATIC_CHARS: &[(char, &str)] = &[
    ('\u{2018}', "'"),   // Left single quote
    ('\u{2019}', "'"),   // Right single quote
    ('\u{201c}', "\""),  // Left double quote
    ('\u{201d}', "\""),  // Right double quote
    ('\u{2013}', "-"),   // En dash
    ('\u{2014}', "-"),   // Em dash
    ('\u{2026}', "..."), // Ellipsis
    ('\u{00a0}', " "),   // Non-breaking space
    ('\u{3000}', " "),   // Ideographic space
    ('\u{200b}', ""),    // Zero-width space
    ('\u{200c}', ""),    // Zero-width non-joiner
    ('\u{200d}', ""),    // Zero-width joiner
    ('\u{feff}', ""),    // BOM
    ('\u{2011}', "-"),   // Non-breaking hyphen
    ('\u{2012}', "-"),   // Figure dash
    ('\u{2015}', "-"),   // Horizontal bar
    ('\u{2032}', "'"),   // Prime
    ('\u{2033}', "\""),  // Double prime
    ('\u{00ab}', "\""),  // Left guillemet
    ('\u{00bb}', "\""),  // Right guillemet
    ('\u{ff05}', "%"),   // Fullwidth percent
];

const CJK_DIGITS: &[(char, char)] = &[
    ('零', '0'),
    ('〇', '0'),
    ('一', '1'),
    ('二', '2'),
    ('三', '3'),
    ('四', '4'),
    ('五', '5'),
    ('六', '6'),
    ('七', '7'),
    ('八', '8'),
    ('九', '9'),
];

static NUMBER_UNIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s+([年月日时分秒])").expect("valid unit regex"));
static NUMBER_PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s+%").expect("valid percent regex"));
static SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+([,;:.!?])").expect("valid punctuation regex"));
static LONG_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4,}").expect("valid digit-run regex"));
static COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"([,，])\s*").expect("valid comma regex"));

/// Clean text for synthesis.
///
/// Replaces problematic Unicode, drops control characters, collapses
/// whitespace inside paragraphs, keeps blank-line paragraph breaks and
/// collapses repeated periods.
pub fn clean_text(text: &str) -> String {
    let mut replaced = String::with_capacity(text.len());

    for c in text.chars() {
        let replacement = PROBLEMATIC_CHARS
            .iter()
            .find(|(ch, _)| *ch == c)
            .map(|(_, r)| *r);

        if let Some(r) = replacement {
            replaced.push_str(r);
        } else if c == '\r' {
            // CRLF and bare CR both end a line
            replaced.push('\n');
        } else if c == '\n' || c == '\t' || c == '\u{000c}' || !c.is_control() {
            replaced.push(c);
        }
    }

    let paragraphs: Vec<String> = split_raw_paragraphs(&replaced)
        .iter()
        .map(|p| collapse_whitespace(p))
        .filter(|p| !p.is_empty())
        .collect();

    fix_multiple_periods(&paragraphs.join("\n\n"))
}

/// Split on blank lines (lines holding only whitespace). Form feeds end a
/// paragraph too.
fn split_raw_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for page in text.split('\u{000c}') {
        for line in page.split('\n') {
            if line.trim().is_empty() {
                if !current.is_empty() {
                    paragraphs.push(std::mem::take(&mut current));
                }
            } else {
                if !current.is_empty() {
                    current.push('\n');
                }
                current.push_str(line);
            }
        }
        if !current.is_empty() {
            paragraphs.push(std::mem::take(&mut current));
        }
    }
    paragraphs
}

/// Collapse every whitespace run to one space. A wrapped line between two
/// CJK characters joins without a space.
fn collapse_whitespace(paragraph: &str) -> String {
    let mut result = String::with_capacity(paragraph.len());
    let mut chars = paragraph.trim().chars().peekable();
    let mut prev: Option<char> = None;

    while let Some(c) = chars.next() {
        if !c.is_whitespace() {
            result.push(c);
            prev = Some(c);
            continue;
        }

        let mut saw_newline = c == '\n';
        while let Some(&next) = chars.peek() {
            if !next.is_whitespace() {
                break;
            }
            saw_newline |= next == '\n';
            chars.next();
        }

        let next = chars.peek().copied();
        let joins_cjk = match (prev, next) {
            (Some(a), Some(b)) => is_cjk(a) && is_cjk(b),
            _ => false,
        };
        if !(saw_newline && joins_cjk) {
            result.push(' ');
        }
    }

    result
}

/// Replace runs of periods with a single period.
fn fix_multiple_periods(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut period_count = 0;

    for c in text.chars() {
        if c == '.' {
            period_count += 1;
            if period_count == 1 {
                result.push('.');
            }
        } else {
            period_count = 0;
            result.push(c);
        }
    }

    result
}

/// CJK digit characters to ASCII digits, then tighten `12 年` and `50 %`.
pub fn normalize_numbers(text: &str) -> String {
    let digits: String = text
        .chars()
        .map(|c| {
            CJK_DIGITS
                .iter()
                .find(|(cjk, _)| *cjk == c)
                .map(|(_, ascii)| *ascii)
                .unwrap_or(c)
        })
        .collect();

    let joined = NUMBER_UNIT.replace_all(&digits, "$1$2");
    NUMBER_PERCENT.replace_all(&joined, "$1%").into_owned()
}

/// Remove spaces before `, ; : . ! ?` and make sure every paragraph ends
/// with a terminal mark.
pub fn normalize_punctuation(text: &str) -> String {
    let tightened = SPACE_BEFORE_PUNCT.replace_all(text, "$1");

    tightened
        .split("\n\n")
        .map(|paragraph| {
            let trimmed = paragraph.trim_end();
            match trimmed.chars().last() {
                None => String::new(),
                Some(last) if super::is_terminal(last) || super::is_closing(last) => {
                    trimmed.to_string()
                }
                Some(last) if is_cjk(last) => format!("{}。", trimmed),
                Some(_) => format!("{}.", trimmed),
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Insert `marker` after commas and after digit runs of four or more.
pub fn insert_rhythm_markers(text: &str, marker: &str) -> String {
    let after_commas = COMMA.replace_all(text, |caps: &regex::Captures| {
        // ASCII commas keep their trailing space
        if &caps[1] == "," {
            format!(",{} ", marker)
        } else {
            format!("{}{}", &caps[1], marker)
        }
    });
    LONG_DIGITS
        .replace_all(&after_commas, |caps: &regex::Captures| {
            format!("{}{}", &caps[0], marker)
        })
        .into_owned()
}
