use crate::error::PatternError;
use regex::{Regex, RegexBuilder};
use std::borrow::Cow;
use tracing::warn;

pub const REDACTION: &str = "[redacted:secret]";

/// Replaces secret-looking substrings before content is counted or rendered.
#[derive(Debug, Clone, Default)]
pub struct SecretScrubber {
    patterns: Vec<Regex>,
}

impl SecretScrubber {
    /// Compile case-insensitive patterns; invalid ones are dropped and returned.
    pub fn new(patterns: &[String]) -> (Self, Vec<PatternError>) {
        let mut compiled = Vec::with_capacity(patterns.len());
        let mut errors = Vec::new();
        for raw in patterns {
            match RegexBuilder::new(raw).case_insensitive(true).build() {
                Ok(re) => compiled.push(re),
                Err(err) => {
                    warn!(pattern = %raw, error = %err, "dropping invalid secret pattern");
                    errors.push(PatternError {
                        pattern: raw.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
        (Self { patterns: compiled }, errors)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Borrowed when nothing matched.
    pub fn scrub<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(text);
        for re in &self.patterns {
            if re.is_match(&out) {
                out = Cow::Owned(re.replace_all(&out, REDACTION).into_owned());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_matches_case_insensitively() {
        let (s, errs) = SecretScrubber::new(&[r"api[_-]?key\s*=\s*\w{8,}".to_string()]);
        assert!(errs.is_empty());
        let out = s.scrub("API_KEY = abcdef123456\nok = 1");
        assert_eq!(out, format!("{REDACTION}\nok = 1"));
    }

    #[test]
    fn untouched_text_is_borrowed() {
        let (s, _) = SecretScrubber::new(&["AKIA[0-9A-Z]{16}".to_string()]);
        assert!(matches!(s.scrub("nothing here"), Cow::Borrowed(_)));
    }

    #[test]
    fn invalid_regex_is_reported() {
        let (s, errs) = SecretScrubber::new(&["(".to_string(), "x".to_string()]);
        assert_eq!(errs.len(), 1);
        assert!(!s.is_empty());
    }
}
