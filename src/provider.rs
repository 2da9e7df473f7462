//! Context providers and the registry they live in.
//!
//! A provider is any type that can turn a [`ProviderRequest`] into a
//! [`ContextResult`]. The built-in `files` provider reads the resolved
//! candidates; others (e.g. `git_diff`) synthesize context from elsewhere.
//!
//! The registry is built once at startup and only read afterwards, so a single
//! registry can serve any number of builds.

use crate::cancel::CancellationToken;
use crate::config::ScanConfig;
use crate::error::{AssemblyError, RegistryError};
use crate::files::FileProvider;
use crate::git_diff::GitDiffProvider;
use crate::model::{ContextFile, ContextResult, FileStatus, ProviderOptions};
use crate::redact::SecretScrubber;
use crate::scanner::FileEntry;
use crate::tokenizer::TokenCounter;
use crate::xml_builder;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    String,
    Boolean,
    Integer,
}

/// One configurable key of a provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionSpec {
    #[serde(rename = "type")]
    pub kind: OptionKind,
    pub default: serde_json::Value,
    pub description: String,
}

impl OptionSpec {
    pub fn new(kind: OptionKind, default: serde_json::Value, description: &str) -> Self {
        Self {
            kind,
            default,
            description: description.to_string(),
        }
    }
}

pub type OptionsSchema = BTreeMap<String, OptionSpec>;

impl OptionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OptionKind::String => "string",
            OptionKind::Boolean => "boolean",
            OptionKind::Integer => "integer",
        }
    }

    /// `value` converted to this kind, or `None` when it has no sensible reading.
    fn coerce(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (OptionKind::String, Value::String(_))
            | (OptionKind::Boolean, Value::Bool(_)) => Some(value.clone()),
            (OptionKind::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Some(value.clone()),
            (OptionKind::String, Value::Number(_) | Value::Bool(_)) => {
                Some(Value::String(value.to_string()))
            }
            (OptionKind::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(Value::Bool(true)),
                "false" | "no" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            (OptionKind::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            _ => None,
        }
    }
}

/// Bring `options` in line with `schema`: values are converted to the declared
/// type where that is unambiguous (`123` for a string option becomes `"123"`).
/// Values that cannot be converted are dropped so the provider falls back to
/// its default, and each one is reported. Keys the schema does not declare
/// pass through untouched.
pub fn coerce_options(
    provider: &str,
    schema: &OptionsSchema,
    options: &ProviderOptions,
) -> (ProviderOptions, Vec<String>) {
    let mut out = ProviderOptions::new();
    let mut problems = Vec::new();
    for (key, value) in options {
        let Some(spec) = schema.get(key) else {
            out.insert(key.clone(), value.clone());
            continue;
        };
        match spec.kind.coerce(value) {
            Some(v) => {
                out.insert(key.clone(), v);
            }
            None => {
                warn!(provider, option = %key, value = %value, "option has the wrong type, using default");
                problems.push(format!(
                    "option {provider}.{key} expects {}, got {value}; using default {}",
                    spec.kind.as_str(),
                    spec.default
                ));
            }
        }
    }
    (out, problems)
}

/// What a provider produced, in the order it produced it. Skipped files stay
/// where they occurred so budget enforcement sees the original order.
#[derive(Debug, Clone, Default)]
pub struct ProviderFiles {
    pub files: Vec<ContextFile>,
    pub diagnostics: Vec<String>,
}

impl ProviderFiles {
    /// Split by status and render on its own, for callers that run a provider
    /// outside of an assembler.
    pub fn into_result(self) -> Result<ContextResult, AssemblyError> {
        let (skipped, included): (Vec<ContextFile>, Vec<ContextFile>) = self
            .files
            .into_iter()
            .partition(|f| f.status == FileStatus::Skipped);
        let total_tokens = included.iter().map(|f| f.tokens).sum();
        let context_xml = xml_builder::render(&[], &included)?;
        let budget_details = format!(
            "{} files included, {} skipped, {} tokens",
            included.len(),
            skipped.len(),
            total_tokens
        );
        Ok(ContextResult {
            context_xml,
            included_files: included,
            skipped_files: skipped,
            total_tokens,
            budget_details,
            diagnostics: self.diagnostics,
        })
    }
}

/// Inputs shared by every provider invocation within one build.
pub struct ProviderRequest<'a> {
    pub options: &'a ProviderOptions,
    /// Output of path resolution; providers that do not read files ignore it.
    pub candidates: &'a [FileEntry],
    pub counter: &'a dyn TokenCounter,
    pub scrubber: &'a SecretScrubber,
    pub cancel: &'a CancellationToken,
}

impl ProviderRequest<'_> {
    pub fn str_option<'o>(&'o self, key: &str, default: &'o str) -> &'o str {
        self.options
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
    }

    pub fn bool_option(&self, key: &str, default: bool) -> bool {
        self.options
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }
}

pub trait ContextProvider: Send + Sync {
    /// Unique registry key.
    fn name(&self) -> &str;

    /// Per-file failures are reported inside the result; an `Err` is reserved
    /// for conditions that abort the whole build (cancellation).
    fn get_context(&self, request: &ProviderRequest<'_>) -> Result<ContextResult, AssemblyError>;

    /// Produced files in order, without rendering. The assembler calls this;
    /// the default flattens `get_context` (included first, then skipped).
    fn collect_files(&self, request: &ProviderRequest<'_>) -> Result<ProviderFiles, AssemblyError> {
        let result = self.get_context(request)?;
        let mut files = result.included_files;
        files.extend(result.skipped_files);
        Ok(ProviderFiles {
            files,
            diagnostics: result.diagnostics,
        })
    }

    /// Configuration keys this provider understands. `None` means no options.
    fn options_schema(&self) -> Option<OptionsSchema> {
        None
    }

    /// Whether this provider consumes resolved candidate files.
    fn reads_candidates(&self) -> bool {
        false
    }
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Box<dyn ContextProvider>>,
    diagnostics: Vec<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `files` and `git_diff` providers.
    pub fn with_builtins(scan: &ScanConfig) -> Self {
        Self::from_providers(builtin_providers(scan))
    }

    /// Register every provider in order. Rejections are kept as diagnostics;
    /// the first provider registered under a name wins.
    pub fn from_providers<I>(providers: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn ContextProvider>>,
    {
        let mut registry = Self::new();
        for provider in providers {
            let _ = registry.register(provider);
        }
        registry
    }

    /// Register a provider. A duplicate or empty name is rejected, logged and
    /// recorded; the existing registration is left untouched.
    pub fn register(&mut self, provider: Box<dyn ContextProvider>) -> Result<(), RegistryError> {
        let name = provider.name().to_string();
        let rejected = if name.trim().is_empty() {
            Some(RegistryError::EmptyName)
        } else if self.get(&name).is_some() {
            Some(RegistryError::DuplicateName { name: name.clone() })
        } else {
            None
        };

        if let Some(err) = rejected {
            warn!(provider = %name, error = %err, "rejected context provider");
            self.diagnostics.push(err.to_string());
            return Err(err);
        }

        info!(provider = %name, "registered context provider");
        self.providers.push(provider);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn ContextProvider> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Registration problems seen so far (duplicate names etc.).
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Name → options schema, for front ends presenting configuration.
    pub fn schemas(&self) -> BTreeMap<String, Option<OptionsSchema>> {
        self.providers
            .iter()
            .map(|p| (p.name().to_string(), p.options_schema()))
            .collect()
    }
}

pub fn builtin_providers(scan: &ScanConfig) -> Vec<Box<dyn ContextProvider>> {
    vec![
        Box::new(FileProvider::from_config(scan)),
        Box::new(GitDiffProvider),
    ]
}
