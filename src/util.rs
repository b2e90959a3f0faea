/// Marker placed in front of output that was cut down to its tail.
pub const ELISION_MARKER: &str = "...(truncated)...\n";

/// Parse "true"/"false"/"1"/"0" from a &str.
pub fn parse_bool_str(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn non_empty_trimmed(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Keep the last `max_chars` characters of `text`, prefixing [`ELISION_MARKER`]
/// when anything was dropped.
pub fn tail_chars(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let skip = total - max_chars;
    let start = text
        .char_indices()
        .nth(skip)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    format!("{ELISION_MARKER}{}", &text[start..])
}

/// Shorten a single-line label to `max_chars`, appending an ellipsis when cut.
pub fn shorten(text: &str, max_chars: usize) -> String {
    let single_line = text.replace(['\r', '\n'], " ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let kept: String = single_line
        .chars()
        .take(max_chars.saturating_sub(3))
        .collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_helpers() {
        assert_eq!(parse_bool_str("true"), Some(true));
        assert_eq!(parse_bool_str("0"), Some(false));
        assert_eq!(parse_bool_str(" YES "), Some(true));
        assert_eq!(parse_bool_str("off"), Some(false));
        assert_eq!(parse_bool_str("maybe"), None);
    }

    #[test]
    fn test_tail_chars_keeps_short_text_untouched() {
        assert_eq!(tail_chars("done\n", 2000), "done\n");
    }

    #[test]
    fn test_tail_chars_elides_front_on_char_boundaries() {
        let text = format!("{}끝", "가".repeat(10));
        let tail = tail_chars(&text, 3);
        assert_eq!(tail, format!("{ELISION_MARKER}가가끝"));
    }

    #[test]
    fn test_shorten_flattens_newlines() {
        assert_eq!(shorten("echo a\necho b", 40), "echo a echo b");
        assert_eq!(shorten("abcdefghij", 6), "abc...");
    }
}
