//! Artifact file names: `<base>_<yymmdd>_<NNN>.<ext>`.

/// Separators a long identifier may be cut at, in order of preference.
const CUT_SEPARATORS: &[char] = &['-', '_', ' ', '.', '—'];

/// Shortest prefix a separator cut may leave.
const MIN_CUT: usize = 10;

/// Replace characters that are unsafe in file names with `_`.
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Shorten `name` to at most `max` characters.
///
/// Cuts at the last separator within the first `max` characters when that
/// keeps at least 60% of `max` (and at least 10 characters), otherwise cuts
/// hard at `max`. Trailing `-`, `_` and spaces are trimmed either way.
pub fn truncate_identifier(name: &str, max: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= max {
        return name.to_string();
    }
    let prefix = &chars[..max];

    let separator_cut = CUT_SEPARATORS.iter().find_map(|sep| {
        let last = prefix.iter().rposition(|c| c == sep)?;
        (last as f64 >= max as f64 * 0.6).then_some(last)
    });

    let cut = match separator_cut {
        Some(pos) if pos >= MIN_CUT => pos,
        _ => max,
    };

    let truncated: String = prefix[..cut].iter().collect();
    let trimmed = truncated.trim_end_matches(['-', '_', ' ']);
    if trimmed.is_empty() {
        truncated
    } else {
        trimmed.to_string()
    }
}

/// Sanitized, truncated base for every artifact of a source.
pub fn artifact_base(source_id: &str, max_len: usize) -> String {
    truncate_identifier(&sanitize(source_id), max_len)
}

pub fn batch_file_name(base: &str, date_stamp: &str, number: usize, ext: &str) -> String {
    format!("{}_{}_{:03}.{}", base, date_stamp, number, ext)
}

pub fn final_file_name(base: &str, date_stamp: &str, ext: &str) -> String {
    format!("{}_{}_complete.{}", base, date_stamp, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a/b:c*d?"), "a_b_c_d_");
        assert_eq!(sanitize("  My Book  "), "My Book");
        assert_eq!(sanitize("   "), "document");
    }

    #[test]
    fn test_truncate_short_name_unchanged() {
        assert_eq!(truncate_identifier("short", 20), "short");
        assert_eq!(truncate_identifier("exactly_twenty_chars", 20), "exactly_twenty_chars");
    }

    #[test]
    fn test_truncate_at_separator() {
        // Last '-' within the first 20 chars sits at 17, past the 60% mark
        assert_eq!(
            truncate_identifier("deep-learning-for-audio-synthesis", 20),
            "deep-learning-for"
        );
    }

    #[test]
    fn test_truncate_prefers_separator_order() {
        // '-' at 5 is too early, so the '_' at 17 wins
        assert_eq!(
            truncate_identifier("intro-chapter one_two three four", 20),
            "intro-chapter one"
        );
    }

    #[test]
    fn test_truncate_hard_cut() {
        assert_eq!(
            truncate_identifier("abcdefghijklmnopqrstuvwxyz", 20),
            "abcdefghijklmnopqrst"
        );
        assert_eq!(truncate_identifier("深度学习与语音合成的研究报告第二版修订稿全文", 10), "深度学习与语音合成的");
    }

    #[test]
    fn test_truncate_trims_trailing_separators() {
        assert_eq!(truncate_identifier("abcdefghijklmnopqrs__tuvwxyz", 20), "abcdefghijklmnopqrs");
    }

    #[test]
    fn test_file_names() {
        assert_eq!(batch_file_name("book", "241014", 7, "mp3"), "book_241014_007.mp3");
        assert_eq!(final_file_name("book", "241014", "wav"), "book_241014_complete.wav");
        assert_eq!(artifact_base("a/very long: name here ok", 12), "a_very long");
    }
}
