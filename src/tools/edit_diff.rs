use crate::ui::text_metrics::wrap_display_lines;

pub const DEFAULT_CONTEXT_LINES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Keep,
    Remove,
    Add,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DiffRow<'a> {
    change: Change,
    text: &'a str,
    old_line: Option<usize>,
    new_line: Option<usize>,
}

/// Line-numbered diff of `old` -> `new` for an edit that starts at
/// `start_line` of the file, wrapped to `width` columns.
///
/// Wrapped pieces of a long line carry `.` in place of the number.
pub fn format_edit_diff(old: &str, new: &str, start_line: usize, width: usize) -> String {
    let old_lines: Vec<&str> = old.split('\n').collect();
    let new_lines: Vec<&str> = new.split('\n').collect();
    let rows = diff_rows(&old_lines, &new_lines, start_line.max(1));
    let hunks = hunk_ranges(&rows, DEFAULT_CONTEXT_LINES);

    if hunks.is_empty() {
        return "(no changes)\n".to_string();
    }

    // "1234 - " prefix
    let text_width = width.saturating_sub(7).max(20);
    let mut out = String::new();
    for (index, (start, end)) in hunks.into_iter().enumerate() {
        if index > 0 {
            out.push_str("   ...\n");
        }
        for row in &rows[start..end] {
            let marker = match row.change {
                Change::Keep => ' ',
                Change::Remove => '-',
                Change::Add => '+',
            };
            let number = row.old_line.or(row.new_line).unwrap_or(start_line);
            for (piece_idx, (_, piece)) in wrap_display_lines(row.text, text_width).into_iter().enumerate() {
                if piece_idx == 0 {
                    out.push_str(&format!("{number:>4} {marker} {piece}\n"));
                } else {
                    out.push_str(&format!("{:>4} {marker} {piece}\n", "."));
                }
            }
        }
    }
    out
}

fn diff_rows<'a>(old: &[&'a str], new: &[&'a str], first_line: usize) -> Vec<DiffRow<'a>> {
    let lcs = lcs_table(old, new);
    let mut rows = Vec::with_capacity(old.len() + new.len());
    let (mut i, mut j) = (0usize, 0usize);

    while i < old.len() || j < new.len() {
        let take_equal = i < old.len() && j < new.len() && old[i] == new[j];
        let take_remove = !take_equal
            && i < old.len()
            && (j >= new.len() || lcs[i + 1][j] >= lcs[i][j + 1]);

        if take_equal {
            rows.push(DiffRow {
                change: Change::Keep,
                text: old[i],
                old_line: Some(first_line + i),
                new_line: Some(first_line + j),
            });
            i += 1;
            j += 1;
        } else if take_remove {
            rows.push(DiffRow {
                change: Change::Remove,
                text: old[i],
                old_line: Some(first_line + i),
                new_line: None,
            });
            i += 1;
        } else {
            rows.push(DiffRow {
                change: Change::Add,
                text: new[j],
                old_line: None,
                new_line: Some(first_line + j),
            });
            j += 1;
        }
    }
    rows
}

fn lcs_table(old: &[&str], new: &[&str]) -> Vec<Vec<usize>> {
    let mut lcs = vec![vec![0usize; new.len() + 1]; old.len() + 1];
    for i in (0..old.len()).rev() {
        for j in (0..new.len()).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }
    lcs
}

fn hunk_ranges(rows: &[DiffRow<'_>], context: usize) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        if row.change == Change::Keep {
            continue;
        }
        let start = index.saturating_sub(context);
        let end = (index + context + 1).min(rows.len());
        match ranges.last_mut() {
            Some((_, previous_end)) if start <= *previous_end => {
                *previous_end = (*previous_end).max(end);
            }
            _ => ranges.push((start, end)),
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_start_at_edit_location() {
        let diff = format_edit_diff("let a = 1;\nlet b = 2;", "let a = 1;\nlet b = 3;", 40, 80);
        assert!(diff.contains("  40   let a = 1;"));
        assert!(diff.contains("  41 - let b = 2;"));
        assert!(diff.contains("  41 + let b = 3;"));
    }

    #[test]
    fn test_long_lines_wrap_with_dot_marker() {
        let long = "x".repeat(50);
        let diff = format_edit_diff("short", &long, 1, 30);
        assert!(diff.contains("   1 + "));
        assert!(diff.contains("   . + "));
    }

    #[test]
    fn test_distant_changes_get_separate_hunks() {
        let old = "a\nb\nc\nd\ne\nf\ng\nh\ni";
        let new = "A\nb\nc\nd\ne\nf\ng\nh\nI";
        let diff = format_edit_diff(old, new, 1, 80);
        assert!(diff.contains("   ...\n"));
        assert!(!diff.contains("   5   e"));
    }

    #[test]
    fn test_identical_text_reports_no_changes() {
        assert_eq!(format_edit_diff("same", "same", 3, 80), "(no changes)\n");
    }
}
