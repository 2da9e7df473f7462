//! Token budget enforcement.
//!
//! Greedy and order-preserving: files are taken in the order given, the first
//! one that does not fit is truncated to the remaining allowance, and
//! everything after it is skipped. Truncation cuts at line boundaries and
//! falls back to a character cut inside the first line when not even one
//! whole line fits.

use crate::model::{ContextFile, FileStatus};
use crate::tokenizer::TokenCounter;
use tracing::{debug, info};

/// Appended after the retained lines of a truncated file when it still fits.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

#[derive(Debug, Clone, Default)]
pub struct BudgetOutcome {
    pub included: Vec<ContextFile>,
    pub skipped: Vec<ContextFile>,
    /// Allowance left after enforcement; `None` when no budget was set.
    pub remaining: Option<usize>,
}

impl BudgetOutcome {
    pub fn used_tokens(&self) -> usize {
        self.included.iter().map(|f| f.tokens).sum()
    }
}

pub fn apply_budget(
    files: Vec<ContextFile>,
    budget: Option<usize>,
    counter: &dyn TokenCounter,
) -> BudgetOutcome {
    let mut out = BudgetOutcome {
        remaining: budget,
        ..BudgetOutcome::default()
    };

    let Some(budget) = budget else {
        for file in files {
            if file.status == FileStatus::Skipped {
                out.skipped.push(file);
            } else {
                out.included.push(file);
            }
        }
        return out;
    };

    let mut remaining = budget;
    for file in files {
        if file.status == FileStatus::Skipped {
            out.skipped.push(file);
            continue;
        }

        if remaining == 0 {
            debug!(path = %file.display_path(), tokens = file.tokens, "budget exhausted, skipping");
            out.skipped.push(skip_for_budget(file));
            continue;
        }

        if file.tokens <= remaining {
            remaining -= file.tokens;
            out.included.push(file);
            continue;
        }

        let original_tokens = file.tokens;
        let text = file.content.as_deref().unwrap_or_default();
        let (kept, tokens) = truncate_to_fit(text, remaining, counter);
        info!(
            path = %file.display_path(),
            from = original_tokens,
            to = tokens,
            allowance = remaining,
            "truncated to fit token budget"
        );
        out.included.push(ContextFile {
            path: file.path,
            content: Some(kept),
            tokens,
            status: FileStatus::Truncated,
        });
        // A truncated file consumes the rest of the allowance.
        remaining = 0;
    }

    out.remaining = Some(remaining);
    out
}

/// Budget-skipped files keep their original count for reporting, but drop content.
fn skip_for_budget(file: ContextFile) -> ContextFile {
    ContextFile {
        path: file.path,
        content: None,
        tokens: file.tokens,
        status: FileStatus::Skipped,
    }
}

/// Longest leading part of `text` whose token count is `<= allowance`.
///
/// Prefers whole lines plus [`TRUNCATION_MARKER`], then whole lines alone, then
/// a character prefix of the first line. The returned count is always a
/// fresh count of the returned text.
pub fn truncate_to_fit(text: &str, allowance: usize, counter: &dyn TokenCounter) -> (String, usize) {
    let fits = |s: &str| counter.count_tokens(s) <= allowance;

    if fits(text) {
        return (text.to_string(), counter.count_tokens(text));
    }

    // Byte offsets after 0, 1, .. n whole lines.
    let mut line_ends = vec![0usize];
    line_ends.extend(text.split_inclusive('\n').scan(0usize, |end, line| {
        *end += line.len();
        Some(*end)
    }));
    let line_count = line_ends.len() - 1;

    let mut kept = String::new();

    let with_marker = largest_fitting(line_count, |k| {
        fits(&format!("{}{}", &text[..line_ends[k]], TRUNCATION_MARKER))
    });
    if with_marker > 0 {
        kept = format!("{}{}", &text[..line_ends[with_marker]], TRUNCATION_MARKER);
    } else {
        let plain = largest_fitting(line_count, |k| fits(&text[..line_ends[k]]));
        if plain > 0 {
            kept = text[..line_ends[plain]].to_string();
        } else {
            let first = text.split_inclusive('\n').next().unwrap_or_default();
            let mut char_ends: Vec<usize> = first.char_indices().map(|(i, _)| i).collect();
            char_ends.push(first.len());
            // char_ends[c] is the byte offset after c chars.
            let chars = largest_fitting(char_ends.len() - 1, |c| fits(&first[..char_ends[c]]));
            kept.push_str(&first[..char_ends[chars]]);
        }
    }

    // Counts are not guaranteed monotone in prefix length for every encoder;
    // shrink until the bound holds.
    let mut tokens = counter.count_tokens(&kept);
    while tokens > allowance && kept.pop().is_some() {
        tokens = counter.count_tokens(&kept);
    }
    (kept, tokens)
}

/// Largest `k` in `1..=n` with `fits(k)`, or `0` when none fits.
/// Assumes `fits` is monotone (true up to some point, false after).
fn largest_fitting(n: usize, fits: impl Fn(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0usize, n);
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}
