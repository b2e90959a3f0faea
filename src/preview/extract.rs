use regex::Regex;

use super::unescape::unescape_json_fragment;

/// The target field as far as it has streamed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSnapshot {
    /// Unescaped value of the identifying field (e.g. the file name), once
    /// it is complete.
    pub label: Option<String>,
    /// Raw, still-escaped field body received so far.
    pub raw_value: String,
    /// The closing quote has arrived.
    pub complete: bool,
}

impl FieldSnapshot {
    pub fn value(&self) -> String {
        unescape_json_fragment(&self.raw_value)
    }
}

/// Pulls one string field out of a JSON object that arrives in pieces.
///
/// Key matches are only accepted at object level: a key name that shows up
/// inside an earlier string value is ignored.
#[derive(Debug)]
pub struct FieldExtractor {
    buffer: String,
    key_pattern: Regex,
    label_pattern: Regex,
    label: Option<String>,
    value_start: Option<usize>,
    scan_pos: usize,
    escape_pending: bool,
    value_end: Option<usize>,
}

impl FieldExtractor {
    pub fn new(field: &str, label_field: &str) -> Result<Self, regex::Error> {
        let key_pattern = Regex::new(&format!(r#""{}"\s*:\s*""#, regex::escape(field)))?;
        let label_pattern = Regex::new(&format!(
            r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)""#,
            regex::escape(label_field)
        ))?;
        Ok(Self {
            buffer: String::new(),
            key_pattern,
            label_pattern,
            label: None,
            value_start: None,
            scan_pos: 0,
            escape_pending: false,
            value_end: None,
        })
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Append a fragment; returns the current view of the field once either
    /// the label or the start of the value has been recognised.
    pub fn feed(&mut self, fragment: &str) -> Option<FieldSnapshot> {
        self.buffer.push_str(fragment);

        if self.label.is_none() {
            self.label = self.find_label();
        }
        if self.value_start.is_none() {
            self.value_start = self.find_value_start();
            self.scan_pos = self.value_start.unwrap_or(0);
        }
        if self.value_start.is_some() && self.value_end.is_none() {
            self.scan_for_terminator();
        }

        self.snapshot()
    }

    pub fn snapshot(&self) -> Option<FieldSnapshot> {
        if self.label.is_none() && self.value_start.is_none() {
            return None;
        }
        let raw_value = match self.value_start {
            Some(start) => {
                let end = self.value_end.unwrap_or(self.buffer.len());
                self.buffer[start..end].to_string()
            }
            None => String::new(),
        };
        Some(FieldSnapshot {
            label: self.label.clone(),
            raw_value,
            complete: self.value_end.is_some(),
        })
    }

    fn find_label(&self) -> Option<String> {
        self.label_pattern
            .captures_iter(&self.buffer)
            .find(|caps| caps.get(0).is_some_and(|m| !inside_string(&self.buffer, m.start())))
            .and_then(|caps| caps.get(1))
            .map(|raw| unescape_json_fragment(raw.as_str()))
    }

    fn find_value_start(&self) -> Option<usize> {
        self.key_pattern
            .find_iter(&self.buffer)
            .find(|m| !inside_string(&self.buffer, m.start()))
            .map(|m| m.end())
    }

    fn scan_for_terminator(&mut self) {
        let bytes = self.buffer.as_bytes();
        while self.scan_pos < bytes.len() {
            let b = bytes[self.scan_pos];
            if self.escape_pending {
                self.escape_pending = false;
            } else if b == b'\\' {
                self.escape_pending = true;
            } else if b == b'"' {
                self.value_end = Some(self.scan_pos);
                return;
            }
            self.scan_pos += 1;
        }
    }
}

/// Whether byte `offset` of `json` falls inside a string literal.
fn inside_string(json: &str, offset: usize) -> bool {
    let mut in_string = false;
    let mut escaped = false;
    for &b in &json.as_bytes()[..offset.min(json.len())] {
        if escaped {
            escaped = false;
        } else if in_string && b == b'\\' {
            escaped = true;
        } else if b == b'"' {
            in_string = !in_string;
        }
    }
    in_string
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> FieldExtractor {
        FieldExtractor::new("content", "filename").expect("patterns")
    }

    #[test]
    fn test_nothing_recognised_yet() {
        let mut ex = extractor();
        assert_eq!(ex.feed(r#"{"file"#), None);
    }

    #[test]
    fn test_value_grows_then_completes() {
        let mut ex = extractor();
        let snap = ex.feed(r#"{"filename":"a.txt","content":"line1\n"#).expect("snapshot");
        assert_eq!(snap.label.as_deref(), Some("a.txt"));
        assert_eq!(snap.raw_value, r"line1\n");
        assert!(!snap.complete);

        let snap = ex.feed(r#"line2"}"#).expect("snapshot");
        assert!(snap.complete);
        assert_eq!(snap.value(), "line1\nline2");
    }

    #[test]
    fn test_escaped_quote_does_not_terminate() {
        let mut ex = extractor();
        ex.feed(r#"{"filename":"q.txt","content":"say \"#);
        let snap = ex.feed(r#""hi\" ok"}"#).expect("snapshot");
        assert!(snap.complete);
        assert_eq!(snap.value(), r#"say "hi" ok"#);
    }

    #[test]
    fn test_key_name_inside_earlier_value_is_ignored() {
        let mut ex = FieldExtractor::new("replacement_text", "filename").expect("patterns");
        let payload = r#"{"filename":"notes.md","target_text":"x \"replacement_text\":\"fake\" y","replacement_text":"real"}"#;
        let snap = ex.feed(payload).expect("snapshot");
        assert_eq!(snap.value(), "real");
        assert!(snap.complete);
    }

    #[test]
    fn test_inside_string_tracks_escapes() {
        let json = r#"{"a":"x\"y","b":"#;
        assert!(inside_string(json, json.find('y').expect("y")));
        assert!(!inside_string(json, json.find(r#""b""#).expect("b")));
    }
}
