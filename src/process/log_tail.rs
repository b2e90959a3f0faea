use encoding_rs::EUC_KR;
use std::path::{Path, PathBuf};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Decode log bytes with a fixed fallback chain: UTF-8 (a partial trailing
/// sequence from a write in progress is held back), UTF-16 when a BOM says
/// so, CP949 (Korean Windows consoles), Latin-1, then lossy UTF-8.
pub fn decode_log_bytes(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        return decode_utf8_lossy(rest);
    }
    if let Some(rest) = bytes.strip_prefix(UTF16_LE_BOM) {
        if let Some(text) = decode_utf16(rest, u16::from_le_bytes) {
            return text;
        }
    }
    if let Some(rest) = bytes.strip_prefix(UTF16_BE_BOM) {
        if let Some(text) = decode_utf16(rest, u16::from_be_bytes) {
            return text;
        }
    }
    if let Some(text) = decode_utf8(bytes) {
        return text;
    }
    // encoding_rs's EUC-KR is the WHATWG superset, i.e. code page 949.
    if let Some(text) = EUC_KR.decode_without_bom_handling_and_without_replacement(bytes) {
        return text.into_owned();
    }
    decode_latin1(bytes).unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned())
}

/// Strict UTF-8; `None` when an invalid sequence appears before the end.
fn decode_utf8(bytes: &[u8]) -> Option<String> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(text.to_string()),
        // error_len() == None means the input ended inside a sequence.
        Err(err) if err.error_len().is_none() => {
            Some(String::from_utf8_lossy(&bytes[..err.valid_up_to()]).into_owned())
        }
        Err(_) => None,
    }
}

fn decode_utf8_lossy(bytes: &[u8]) -> String {
    decode_utf8(bytes).unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned())
}

/// Latin-1, refused when the bytes hold C1 controls that no text would contain.
fn decode_latin1(bytes: &[u8]) -> Option<String> {
    if bytes.iter().any(|b| (0x80..=0x9F).contains(b)) {
        return None;
    }
    Some(bytes.iter().map(|&b| char::from(b)).collect())
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> Option<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

/// Split decoded log text into display lines with escapes removed.
fn display_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = text
        .split('\n')
        .map(|line| strip_ansi_escapes::strip_str(line.trim_end_matches('\r')))
        .collect();
    if lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

/// The last `max_lines` lines of the artifact at `path`.
///
/// A missing file or a failed read both mean "no output yet".
pub fn read_tail(path: &Path, max_lines: usize) -> Vec<String> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::trace!(path = %path.display(), error = %err, "log tail read skipped");
            }
            return Vec::new();
        }
    };
    let mut lines = display_lines(&decode_log_bytes(&bytes));
    if lines.len() > max_lines {
        lines.drain(..lines.len() - max_lines);
    }
    lines
}

/// Tails one artifact and reports only changes since the previous poll.
#[derive(Debug)]
pub struct LogTail {
    path: PathBuf,
    max_lines: usize,
    last: Option<Vec<String>>,
}

impl LogTail {
    pub fn new(path: impl Into<PathBuf>, max_lines: usize) -> Self {
        Self {
            path: path.into(),
            max_lines: max_lines.max(1),
            last: None,
        }
    }

    pub fn poll(&mut self) -> Option<Vec<String>> {
        let lines = read_tail(&self.path, self.max_lines);
        if self.last.as_ref() == Some(&lines) {
            return None;
        }
        self.last = Some(lines.clone());
        Some(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_tail_missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(read_tail(&dir.path().join("nope.log"), 5).is_empty());
    }

    #[test]
    fn test_read_tail_keeps_last_lines_and_strips_ansi() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.log");
        std::fs::write(&path, "one\r\ntwo\n\x1b[31mthree\x1b[0m\n").expect("write");
        assert_eq!(read_tail(&path, 2), vec!["two", "three"]);
    }

    #[test]
    fn test_decode_holds_back_partial_utf8_sequence() {
        let mut bytes = "완료".as_bytes().to_vec();
        bytes.extend_from_slice(&"다".as_bytes()[..2]);
        assert_eq!(decode_log_bytes(&bytes), "완료");
    }

    #[test]
    fn test_decode_utf16_with_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "hi".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_log_bytes(&bytes), "hi");
    }

    #[test]
    fn test_decode_cp949_console_output() {
        // "완료" in code page 949.
        assert_eq!(decode_log_bytes(&[0xBF, 0xCF, 0xB7, 0xE1]), "완료");
    }

    #[test]
    fn test_decode_falls_back_to_latin1() {
        assert_eq!(decode_log_bytes(&[b'a', 0xFF, b'b']), "a\u{FF}b");
    }

    #[test]
    fn test_decode_undecodable_bytes_is_lossy() {
        assert_eq!(decode_log_bytes(&[b'a', 0x80, b'b']), "a\u{FFFD}b");
    }

    #[test]
    fn test_read_tail_keeps_tabs_for_the_view_to_expand() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t.log");
        std::fs::write(&path, "a\tb\n").expect("write");
        assert_eq!(read_tail(&path, 5), vec!["a\tb"]);
    }

    #[test]
    fn test_log_tail_reports_only_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("grow.log");
        let mut tail = LogTail::new(&path, 3);

        assert_eq!(tail.poll(), Some(Vec::new()));
        assert_eq!(tail.poll(), None);

        let mut file = std::fs::File::create(&path).expect("create");
        writeln!(file, "first").expect("write");
        assert_eq!(tail.poll(), Some(vec!["first".to_string()]));
        assert_eq!(tail.poll(), None);
    }
}
