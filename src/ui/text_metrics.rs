use unicode_width::UnicodeWidthChar;

const TAB_WIDTH: usize = 4;

pub fn char_display_width(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(0)
}

pub fn display_width(text: &str) -> usize {
    text.chars().map(char_display_width).sum()
}

/// Replace characters the terminal would not draw as one measured cell.
///
/// Tabs become `TAB_WIDTH` spaces; other control characters become `?`.
pub fn sanitize_for_display(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\t' => out.extend(std::iter::repeat(' ').take(TAB_WIDTH)),
            c if c.is_control() => out.push('?'),
            c => out.push(c),
        }
    }
    out
}

/// Cut `text` so it occupies at most `max_width` columns.
///
/// A wide character that would straddle the limit is dropped rather than
/// allowed to overflow, so the terminal never soft-wraps the result.
pub fn truncate_to_display_width(text: &str, max_width: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;
    for ch in text.chars() {
        let ch_width = char_display_width(ch);
        if used + ch_width > max_width {
            break;
        }
        out.push(ch);
        used += ch_width;
    }
    out
}

/// Split `input` on newlines and wrap each logical line to `width` columns.
///
/// Returns `(logical_line_index, segment)` pairs; the index lets callers tell
/// a fresh line from a continuation of the previous one.
pub fn wrap_display_lines(input: &str, width: usize) -> Vec<(usize, String)> {
    let width = width.max(1);
    let mut out = Vec::new();

    for (logical, raw_line) in input.split('\n').enumerate() {
        let mut segment = String::new();
        let mut used = 0usize;
        let mut emitted = false;

        for ch in raw_line.chars() {
            if ch == '\r' {
                continue;
            }
            if ch == '\t' {
                for _ in 0..TAB_WIDTH {
                    if used + 1 > width {
                        out.push((logical, std::mem::take(&mut segment)));
                        emitted = true;
                        used = 0;
                    }
                    segment.push(' ');
                    used += 1;
                }
                continue;
            }
            let ch_width = char_display_width(ch);
            if used + ch_width > width && used > 0 {
                out.push((logical, std::mem::take(&mut segment)));
                emitted = true;
                used = 0;
            }
            segment.push(ch);
            used += ch_width;
        }

        if !segment.is_empty() || !emitted {
            out.push((logical, segment));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_width_counts_wide_chars() {
        assert_eq!(display_width("abc"), 3);
        assert_eq!(display_width("한글"), 4);
    }

    #[test]
    fn test_truncate_never_overflows_with_wide_chars() {
        assert_eq!(truncate_to_display_width("한글abc", 3), "한");
        assert_eq!(truncate_to_display_width("abc", 10), "abc");
        assert_eq!(truncate_to_display_width("한", 1), "");
    }

    #[test]
    fn test_sanitize_expands_tabs_and_masks_controls() {
        assert_eq!(sanitize_for_display("\ta\x07b\x1b"), "    a?b?");
        assert_eq!(sanitize_for_display("한글"), "한글");
    }

    #[test]
    fn test_wrap_display_lines_marks_continuations() {
        let wrapped = wrap_display_lines("abcdef\nxy", 4);
        assert_eq!(
            wrapped,
            vec![
                (0, "abcd".to_string()),
                (0, "ef".to_string()),
                (1, "xy".to_string()),
            ]
        );
    }

    #[test]
    fn test_wrap_display_lines_keeps_empty_lines() {
        let wrapped = wrap_display_lines("a\n\nb", 10);
        assert_eq!(wrapped.len(), 3);
        assert_eq!(wrapped[1], (1, String::new()));
    }

    #[test]
    fn test_wrap_display_lines_wraps_wide_chars_by_columns() {
        let wrapped = wrap_display_lines("가나다", 4);
        assert_eq!(
            wrapped,
            vec![(0, "가나".to_string()), (0, "다".to_string())]
        );
    }

    #[test]
    fn test_wrap_display_lines_expands_tabs() {
        let wrapped = wrap_display_lines("\tx", 10);
        assert_eq!(wrapped, vec![(0, "    x".to_string())]);
    }
}
