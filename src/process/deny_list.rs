use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use regex::{Regex, RegexBuilder};

use super::SupervisorError;

/// Substrings that are never allowed to reach a shell.
pub const DANGEROUS_PATTERNS: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "mkfs",
    "format c:",
    "rd /s /q",
    ":(){ :|:& };:",
];

/// Whole words that are never allowed, wherever they appear in the command.
pub const DANGEROUS_WORDS: &[&str] = &["sudo"];

pub struct DenyList {
    patterns: Vec<String>,
    matcher: Option<AhoCorasick>,
    words: Vec<(String, Regex)>,
}

impl DenyList {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(Into::into)
            .filter(|p| !p.is_empty())
            .collect();
        let matcher = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostFirst)
            .build(&patterns)
            .ok();
        Self {
            patterns,
            matcher,
            words: Vec::new(),
        }
    }

    /// Also reject `word` when it stands alone (`sudo`, `sudo\tx`, `x;sudo`),
    /// but not inside a longer word (`pseudo`).
    pub fn with_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for word in words {
            let word = word.into();
            if word.is_empty() {
                continue;
            }
            let pattern = format!(r"\b{}\b", regex::escape(&word));
            match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                Ok(regex) => self.words.push((word, regex)),
                Err(err) => tracing::warn!(word = %word, error = %err, "deny word skipped"),
            }
        }
        self
    }

    /// The first dangerous pattern found in `command`, if any.
    pub fn find(&self, command: &str) -> Option<&str> {
        let substring = match &self.matcher {
            Some(matcher) => matcher
                .find(command)
                .map(|m| self.patterns[m.pattern().as_usize()].as_str()),
            None => {
                let lowered = command.to_ascii_lowercase();
                self.patterns
                    .iter()
                    .find(|p| lowered.contains(&p.to_ascii_lowercase()))
                    .map(String::as_str)
            }
        };
        substring.or_else(|| {
            self.words
                .iter()
                .find(|(_, regex)| regex.is_match(command))
                .map(|(word, _)| word.as_str())
        })
    }

    pub fn check(&self, command: &str) -> Result<(), SupervisorError> {
        match self.find(command) {
            Some(pattern) => Err(SupervisorError::BlockedCommand {
                pattern: pattern.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl Default for DenyList {
    fn default() -> Self {
        Self::new(DANGEROUS_PATTERNS.iter().copied()).with_words(DANGEROUS_WORDS.iter().copied())
    }
}
