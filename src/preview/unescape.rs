/// Unescape the raw (still-quoted) body of a JSON string.
///
/// The input may be cut anywhere: an escape sequence that is not complete
/// yet, including the first half of a surrogate pair, is left out of the
/// result until more input arrives. Unknown escapes are kept verbatim.
pub fn unescape_json_fragment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some((_, esc)) = chars.next() else {
            break;
        };
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{0008}'),
            'f' => out.push('\u{000C}'),
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            '/' => out.push('/'),
            'u' => {
                let start = idx + 2;
                let Some(high) = parse_hex4(raw, start) else {
                    if raw.len() < start + 4 {
                        break;
                    }
                    out.push_str(&raw[idx..start]);
                    continue;
                };
                skip(&mut chars, 4);

                if (0xD800..0xDC00).contains(&high) {
                    let low_start = start + 4;
                    if raw.len() < low_start + 6 {
                        // Low surrogate not fully arrived.
                        if raw[low_start..].starts_with("\\u") || raw.len() - low_start < 2 {
                            break;
                        }
                        out.push(char::REPLACEMENT_CHARACTER);
                        continue;
                    }
                    let low = if raw[low_start..].starts_with("\\u") {
                        parse_hex4(raw, low_start + 2)
                    } else {
                        None
                    };
                    match low {
                        Some(low) if (0xDC00..0xE000).contains(&low) => {
                            skip(&mut chars, 6);
                            let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                            out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                        }
                        _ => out.push(char::REPLACEMENT_CHARACTER),
                    }
                } else {
                    out.push(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    out
}

fn parse_hex4(raw: &str, start: usize) -> Option<u32> {
    let digits = raw.get(start..start + 4)?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

fn skip<I: Iterator>(iter: &mut I, n: usize) {
    for _ in 0..n {
        if iter.next().is_none() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_escapes() {
        assert_eq!(
            unescape_json_fragment(r#"line1\nline2\t\"q\"\\ \/"#),
            "line1\nline2\t\"q\"\\ /"
        );
    }

    #[test]
    fn test_unicode_and_surrogate_pairs() {
        assert_eq!(unescape_json_fragment(r"\ud55c\uae00"), "한글");
        assert_eq!(unescape_json_fragment(r"\ud83d\ude00!"), "😀!");
    }

    #[test]
    fn test_incomplete_escapes_are_withheld() {
        assert_eq!(unescape_json_fragment(r"abc\"), "abc");
        assert_eq!(unescape_json_fragment(r"abc\u00"), "abc");
        assert_eq!(unescape_json_fragment(r"x\ud83d"), "x");
        assert_eq!(unescape_json_fragment(r"x\ud83d\ude"), "x");
    }

    #[test]
    fn test_lone_surrogate_becomes_replacement() {
        assert_eq!(unescape_json_fragment(r"\ud83dabcdefg"), "\u{FFFD}abcdefg");
    }
}
