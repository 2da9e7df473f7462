use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CONFIG_FILE_JSON: &str = ".promptweave.json";
pub const CONFIG_FILE_TOML: &str = ".promptweave.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenEstimatorConfig {
    /// tiktoken encoding name, or `"heuristic"` to always estimate.
    pub encoding: String,
    /// Used by the heuristic estimate and as the fallback when the encoder is unavailable.
    pub chars_per_token: usize,
}

impl Default for TokenEstimatorConfig {
    fn default() -> Self {
        Self {
            encoding: "cl100k_base".to_string(),
            chars_per_token: 4,
        }
    }
}

/// Controls workspace scanning behavior (what to skip, how to walk).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Exclude globs appended to every request unless the front end opts out.
    pub ignore_patterns: Vec<String>,
    /// Honor `.gitignore` / `.ignore` files found while walking.
    pub respect_gitignore: bool,
    pub include_hidden: bool,
    /// Symlinked directories are followed; loops are detected and broken.
    pub follow_symlinks: bool,
    /// Files larger than this are skipped without being read.
    pub max_file_bytes: u64,
    /// Extensions (no dot, case-insensitive) that are never read as text.
    pub binary_extensions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let mut ignore_patterns: Vec<String> = [
            // Version control
            ".git", ".svn", ".hg",
            // IDE/editor state
            ".idea", ".vscode",
            // Python caches and virtualenvs
            "__pycache__", ".pytest_cache", ".mypy_cache", "venv", ".venv",
            // Build outputs
            "build", "dist", "node_modules", "target",
        ]
        .iter()
        .map(|d| format!("**/{d}/**"))
        .collect();
        ignore_patterns.extend(
            ["**/*.pyc", "**/*.pyo", "**/*.log", "**/.DS_Store", "**/Thumbs.db"]
                .iter()
                .map(|p| p.to_string()),
        );

        Self {
            ignore_patterns,
            respect_gitignore: false,
            include_hidden: true,
            follow_symlinks: true,
            max_file_bytes: 1024 * 1024,
            binary_extensions: DEFAULT_BINARY_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

pub const DEFAULT_BINARY_EXTENSIONS: &[&str] = &[
    // Images
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "psd",
    // Audio / video
    "mp3", "mp4", "wav", "ogg", "flac", "mov", "avi", "mkv", "webm",
    // Archives
    "zip", "gz", "tgz", "bz2", "xz", "7z", "rar", "tar", "jar", "whl",
    // Compiled artifacts
    "exe", "dll", "so", "dylib", "a", "o", "lib", "class", "pyc", "pyo", "pyd", "wasm", "rlib",
    // Documents / fonts / data
    "pdf", "woff", "woff2", "ttf", "otf", "eot", "sqlite", "db", "bin", "dat",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default token ceiling; `None` disables the budget.
    pub max_context_tokens: Option<usize>,
    pub token_estimator: TokenEstimatorConfig,
    pub scan: ScanConfig,
    /// Case-insensitive regexes whose matches are redacted from file content.
    pub secret_patterns: Vec<String>,
    /// Snippet library: category → snippet name → text.
    pub snippets: BTreeMap<String, BTreeMap<String, String>>,
    /// Common follow-up questions offered by front ends.
    pub questions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_context_tokens: Some(8192),
            token_estimator: TokenEstimatorConfig::default(),
            scan: ScanConfig::default(),
            secret_patterns: default_secret_patterns(),
            snippets: default_snippets(),
            questions: vec![
                "What is one thing you would change/improve if you could and why?".to_string(),
                "Is this solution lacking? What is missing?".to_string(),
                "Do you see opportunities to improve the structure?".to_string(),
            ],
        }
    }
}

fn default_secret_patterns() -> Vec<String> {
    vec![
        // AWS access key id
        r"\bAKIA[0-9A-Z]{16}\b".to_string(),
        r#"(aws_secret_access_key|secret_access_key)[\s:=]+['"]?[a-zA-Z0-9/+=]{40}['"]?"#.to_string(),
        r#"api[_-]?key[\s:=]+['"]?[a-zA-Z0-9_\-]{20,}['"]?"#.to_string(),
        r#"secret[\s:=]+['"]?[a-zA-Z0-9_\-]{16,}['"]?"#.to_string(),
        r"-----BEGIN (RSA|OPENSSH|EC|PGP) PRIVATE KEY-----".to_string(),
    ]
}

fn default_snippets() -> BTreeMap<String, BTreeMap<String, String>> {
    let table: &[(&str, &[(&str, &str)])] = &[
        (
            "objective",
            &[
                ("concept", "Your task is to develop a concept."),
                ("review", "Review the provided context carefully and thoroughly."),
                ("debug", "Try to debug any errors."),
                ("develop", "Implement a new feature or system."),
            ],
        ),
        (
            "scope",
            &[
                ("everything", "Scope includes everything."),
                ("high-level", "Scope: High-level."),
                ("low-level", "Scope: Low-level or details."),
            ],
        ),
        (
            "requirements",
            &[
                ("in-depth", "Your solution should be prepared in-depth."),
                ("superficial", "A superficial solution will suffice."),
                ("high-quality", "Provide a solution of extraordinary quality."),
                ("creative", "Provide a creative, unexpected solution, not a super predictable one."),
            ],
        ),
        (
            "constraints",
            &[
                ("2-sentences", "Explain in exactly 2 sentences."),
                ("2-paragraphs", "Explain in exactly 2 paragraphs."),
                ("500-loc", "Limit to 500 lines of code."),
                ("no-placeholders", "Don't use placeholders, always provide the full solution."),
            ],
        ),
        (
            "process",
            &[
                ("cot", "Chain-of-thought reasoning recommended."),
                (
                    "3-iterations",
                    "Iterate on this solution 3 times by reviewing it, finding improvements, and refining further.",
                ),
            ],
        ),
        (
            "output",
            &[
                ("xml", "Use an XML-styled output format."),
                ("summary", "At the end, provide a verbose summary."),
                ("prod-ready", "Must be production-ready."),
                ("full-and-final", "Give me the full and final scripts you added or modified."),
            ],
        ),
    ];

    table
        .iter()
        .map(|(category, items)| {
            let items = items
                .iter()
                .map(|(name, text)| (name.to_string(), text.to_string()))
                .collect();
            (category.to_string(), items)
        })
        .collect()
}

impl Config {
    /// Look up a library snippet. Category and name match case-insensitively.
    pub fn snippet_text(&self, category: &str, name: &str) -> Option<&str> {
        let (_, items) = self
            .snippets
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(category))?;
        items
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, text)| text.as_str())
    }
}

/// Resolve and load the effective config.
///
/// Order: `explicit` → `<repo_root>/.promptweave.json` → `<repo_root>/.promptweave.toml`
/// → `<user config dir>/promptweave/config.json` → defaults. A file that cannot
/// be read or parsed is logged and skipped; loading never fails.
pub fn load_config(repo_root: &Path, explicit: Option<&Path>) -> Config {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(p) = explicit {
        candidates.push(p.to_path_buf());
    }
    candidates.push(repo_root.join(CONFIG_FILE_JSON));
    candidates.push(repo_root.join(CONFIG_FILE_TOML));
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("promptweave").join("config.json"));
    }

    for path in candidates {
        let Ok(text) = std::fs::read_to_string(&path) else {
            debug!(path = %path.display(), "no config file");
            continue;
        };
        match parse_config(&path, &text) {
            Ok(cfg) => {
                info!(path = %path.display(), "loaded configuration");
                return cfg;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring malformed config file");
            }
        }
    }

    Config::default()
}

fn parse_config(path: &Path, text: &str) -> anyhow::Result<Config> {
    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
    if is_toml {
        Ok(toml::from_str::<Config>(text)?)
    } else {
        Ok(serde_json::from_str::<Config>(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_have_budget_and_library() {
        let cfg = Config::default();
        assert_eq!(cfg.max_context_tokens, Some(8192));
        assert_eq!(cfg.snippet_text("Objective", "Review"), Some("Review the provided context carefully and thoroughly."));
        assert!(cfg.scan.binary_extensions.iter().any(|e| e == "png"));
        assert!(cfg.scan.ignore_patterns.iter().any(|p| p == "**/.git/**"));
    }

    #[test]
    fn repo_json_overrides_partial_fields() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE_JSON),
            r#"{ "max_context_tokens": 100, "token_estimator": { "encoding": "heuristic" } }"#,
        )
        .unwrap();

        let cfg = load_config(tmp.path(), None);
        assert_eq!(cfg.max_context_tokens, Some(100));
        assert_eq!(cfg.token_estimator.encoding, "heuristic");
        // Untouched sections keep their defaults.
        assert_eq!(cfg.token_estimator.chars_per_token, 4);
        assert!(!cfg.snippets.is_empty());
    }

    #[test]
    fn toml_config_is_supported() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE_TOML),
            "max_context_tokens = 42\n[scan]\nrespect_gitignore = true\n",
        )
        .unwrap();

        let cfg = load_config(tmp.path(), None);
        assert_eq!(cfg.max_context_tokens, Some(42));
        assert!(cfg.scan.respect_gitignore);
    }

    #[test]
    fn explicit_path_wins_and_malformed_falls_through() {
        let tmp = TempDir::new().unwrap();
        let explicit = tmp.path().join("custom.json");
        std::fs::write(&explicit, "{ not json").unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE_JSON), r#"{ "max_context_tokens": 7 }"#).unwrap();

        let cfg = load_config(tmp.path(), Some(&explicit));
        assert_eq!(cfg.max_context_tokens, Some(7));
    }
}
