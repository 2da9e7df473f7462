//! Token counting.
//!
//! Counts are advisory (they drive budgeting, nothing else), so when the BPE
//! backend is unavailable we fall back to a chars-per-token estimate instead of
//! failing. [`TokenCounter::is_approximate`] lets the caller say so in the
//! build summary.

use crate::config::TokenEstimatorConfig;
use std::sync::Arc;
use tracing::warn;

pub trait TokenCounter: Send + Sync {
    /// Number of tokens in `text`. Deterministic for a fixed counter.
    fn count_tokens(&self, text: &str) -> usize;

    /// Short human-readable description, e.g. `tiktoken cl100k_base`.
    fn describe(&self) -> String;

    fn is_approximate(&self) -> bool {
        false
    }
}

/// `ceil(chars / chars_per_token)`. Rounds up so estimates err on the large side.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicCounter {
    chars_per_token: usize,
}

impl HeuristicCounter {
    pub fn new(chars_per_token: usize) -> Self {
        Self { chars_per_token }
    }
}

impl Default for HeuristicCounter {
    fn default() -> Self {
        Self::new(4)
    }
}

pub fn estimate_tokens_from_chars(chars: usize, chars_per_token: usize) -> usize {
    if chars_per_token == 0 {
        return chars;
    }
    chars.div_ceil(chars_per_token)
}

impl TokenCounter for HeuristicCounter {
    fn count_tokens(&self, text: &str) -> usize {
        estimate_tokens_from_chars(text.chars().count(), self.chars_per_token)
    }

    fn describe(&self) -> String {
        format!("heuristic ~{} chars/token", self.chars_per_token)
    }

    fn is_approximate(&self) -> bool {
        true
    }
}

#[cfg(feature = "tiktoken")]
pub struct TiktokenCounter {
    encoding: String,
    bpe: tiktoken_rs::CoreBPE,
}

#[cfg(feature = "tiktoken")]
impl TiktokenCounter {
    pub fn new(encoding: &str) -> anyhow::Result<Self> {
        let bpe = match encoding {
            "cl100k_base" => tiktoken_rs::cl100k_base()?,
            "o200k_base" => tiktoken_rs::o200k_base()?,
            "p50k_base" => tiktoken_rs::p50k_base()?,
            "r50k_base" | "gpt2" => tiktoken_rs::r50k_base()?,
            other => anyhow::bail!("unknown tiktoken encoding '{other}'"),
        };
        Ok(Self {
            encoding: encoding.to_string(),
            bpe,
        })
    }
}

#[cfg(feature = "tiktoken")]
impl TokenCounter for TiktokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_ordinary(text).len()
    }

    fn describe(&self) -> String {
        format!("tiktoken {}", self.encoding)
    }
}

/// Build the process-wide counter from config.
///
/// `encoding = "heuristic"` selects the estimate directly. Any other name is
/// loaded as a tiktoken encoding; if that fails (feature disabled, unknown
/// name) the heuristic is used and a warning is logged.
pub fn build_counter(cfg: &TokenEstimatorConfig) -> Arc<dyn TokenCounter> {
    let heuristic = HeuristicCounter::new(cfg.chars_per_token);
    if cfg.encoding.eq_ignore_ascii_case("heuristic") {
        return Arc::new(heuristic);
    }

    #[cfg(feature = "tiktoken")]
    {
        match TiktokenCounter::new(&cfg.encoding) {
            Ok(counter) => {
                tracing::debug!(encoding = %cfg.encoding, "loaded tiktoken encoder");
                return Arc::new(counter);
            }
            Err(err) => {
                warn!(encoding = %cfg.encoding, error = %err, "tokenizer unavailable, estimating token counts");
            }
        }
    }

    #[cfg(not(feature = "tiktoken"))]
    warn!(encoding = %cfg.encoding, "built without tiktoken support, estimating token counts");

    Arc::new(heuristic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_rounds_up() {
        let c = HeuristicCounter::new(4);
        assert_eq!(c.count_tokens(""), 0);
        assert_eq!(c.count_tokens("abc"), 1);
        assert_eq!(c.count_tokens("abcd"), 1);
        assert_eq!(c.count_tokens("abcde"), 2);
        assert!(c.is_approximate());
    }

    #[test]
    fn heuristic_counts_chars_not_bytes() {
        let c = HeuristicCounter::new(2);
        assert_eq!(c.count_tokens("ééé"), 2);
    }

    #[test]
    fn zero_chars_per_token_counts_every_char() {
        assert_eq!(estimate_tokens_from_chars(7, 0), 7);
    }

    #[test]
    fn explicit_heuristic_encoding_skips_backend() {
        let cfg = TokenEstimatorConfig {
            encoding: "heuristic".into(),
            chars_per_token: 3,
        };
        let counter = build_counter(&cfg);
        assert!(counter.is_approximate());
        assert_eq!(counter.count_tokens("abcdef"), 2);
    }

    #[test]
    fn unknown_encoding_falls_back() {
        let cfg = TokenEstimatorConfig {
            encoding: "no-such-encoding".into(),
            chars_per_token: 4,
        };
        let counter = build_counter(&cfg);
        assert!(counter.is_approximate());
        assert!(counter.describe().starts_with("heuristic"));
    }

    #[cfg(feature = "tiktoken")]
    #[test]
    fn tiktoken_counts_are_exact_and_stable() {
        let counter = TiktokenCounter::new("cl100k_base").unwrap();
        assert_eq!(counter.count_tokens(""), 0);
        assert_eq!(counter.count_tokens("hello world"), 2);
        assert_eq!(counter.count_tokens("hello world"), counter.count_tokens("hello world"));
        assert!(!counter.is_approximate());
    }
}
