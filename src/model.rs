use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Outcome of processing one candidate file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Generated,
    Truncated,
    Skipped,
    Error,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Generated => "generated",
            FileStatus::Truncated => "truncated",
            FileStatus::Skipped => "skipped",
            FileStatus::Error => "error",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file (or pseudo-file, for synthesized providers) in a build.
///
/// Values are created once by a provider or by the budget enforcer and never
/// edited in place; truncation and skipping produce a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFile {
    pub path: PathBuf,
    pub content: Option<String>,
    pub tokens: usize,
    pub status: FileStatus,
}

impl ContextFile {
    pub fn generated(path: impl Into<PathBuf>, content: String, tokens: usize) -> Self {
        Self {
            path: path.into(),
            content: Some(content),
            tokens,
            status: FileStatus::Generated,
        }
    }

    /// Skipped before reading (binary, oversized). Never carries content.
    pub fn skipped(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            content: None,
            tokens: 0,
            status: FileStatus::Skipped,
        }
    }

    /// Unreadable file: zero tokens and a placeholder explaining why.
    pub fn error(path: impl Into<PathBuf>, placeholder: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(placeholder.into()),
            tokens: 0,
            status: FileStatus::Error,
        }
    }

    /// File name shown in the `name` attribute of the rendered `<file>` element.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.display_path())
    }

    /// Path with `/` separators regardless of platform.
    pub fn display_path(&self) -> String {
        display_path(&self.path)
    }
}

/// `/`-separated rendering of a path, used for matching and output.
pub fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Result of one build (or of one provider invocation).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextResult {
    pub context_xml: String,
    pub included_files: Vec<ContextFile>,
    pub skipped_files: Vec<ContextFile>,
    /// Always the exact sum of `tokens` over `included_files`.
    pub total_tokens: usize,
    pub budget_details: String,
    /// Non-fatal warnings gathered while building.
    pub diagnostics: Vec<String>,
}

impl ContextResult {
    pub fn count_status(&self, status: FileStatus) -> usize {
        self.included_files
            .iter()
            .chain(self.skipped_files.iter())
            .filter(|f| f.status == status)
            .count()
    }
}

/// A named block of instruction text, e.g. `objective` → "Review the code."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub key: String,
    pub text: String,
}

impl Snippet {
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }
}

/// Options handed to a single provider, keyed by option name.
pub type ProviderOptions = serde_json::Map<String, serde_json::Value>;

/// Everything one `build()` call needs. Constructed per invocation by a front end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildRequest {
    pub roots: Vec<PathBuf>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub token_budget: Option<usize>,
    pub selected_snippets: Vec<Snippet>,
    /// Follow-up questions, rendered after the snippets as one `questions` entry.
    pub questions: Vec<String>,
    /// Providers to run, in order. Empty means the built-in file provider.
    pub providers: Vec<String>,
    pub provider_options: BTreeMap<String, ProviderOptions>,
}

impl BuildRequest {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include_patterns.push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    pub fn budget(mut self, tokens: usize) -> Self {
        self.token_budget = Some(tokens);
        self
    }

    pub fn snippet(mut self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.selected_snippets.push(Snippet::new(key, text));
        self
    }

    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.providers.push(name.into());
        self
    }

    pub fn provider_option(
        mut self,
        provider: &str,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.provider_options
            .entry(provider.to_string())
            .or_default()
            .insert(key.into(), value);
        self
    }

    /// Instruction entries in render order: snippets as given, then questions.
    pub fn instructions(&self) -> Vec<Snippet> {
        let mut out = self.selected_snippets.clone();
        if !self.questions.is_empty() {
            out.push(Snippet::new("questions", self.questions.join("\n")));
        }
        out
    }
}
