//! Paragraph, sentence and clause splitting.

use super::{is_cjk, is_closing, is_secondary, is_terminal};

/// Split cleaned text into paragraphs on blank lines.
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Split a paragraph into sentences.
///
/// A sentence ends at a run of terminal punctuation plus any closing quote
/// or bracket right after it. A period only ends a sentence when followed
/// by whitespace, a CJK character, a closing mark or the end of the text,
/// so `3.14` and `example.com` stay whole.
pub fn split_sentences(paragraph: &str) -> Vec<String> {
    let chars: Vec<char> = paragraph.chars().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        current.push(c);
        i += 1;

        if !is_terminal(c) {
            continue;
        }

        while i < chars.len() && is_terminal(chars[i]) {
            current.push(chars[i]);
            i += 1;
        }

        let ends_here = match chars.get(i) {
            None => true,
            Some(&next) => {
                c != '.' || next.is_whitespace() || is_closing(next) || is_cjk(next)
            }
        };
        if !ends_here {
            continue;
        }

        while i < chars.len() && is_closing(chars[i]) {
            current.push(chars[i]);
            i += 1;
        }
        push_trimmed(&mut sentences, &mut current);
    }

    push_trimmed(&mut sentences, &mut current);
    sentences
}

/// Split a sentence at secondary punctuation, keeping each mark with the
/// piece on its left.
pub fn split_clauses(sentence: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut current = String::new();

    for c in sentence.chars() {
        current.push(c);
        if is_secondary(c) {
            push_trimmed(&mut clauses, &mut current);
        }
    }
    push_trimmed(&mut clauses, &mut current);
    clauses
}

fn push_trimmed(out: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    current.clear();
}
