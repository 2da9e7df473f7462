//! The single entry point front ends call: `BuildRequest` in, `ContextResult` out.

use crate::budget::{apply_budget, BudgetOutcome};
use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::error::{AssemblyError, Result};
use crate::model::{BuildRequest, ContextFile, ContextResult, FileStatus, ProviderOptions};
use crate::provider::{coerce_options, ContextProvider, ProviderRegistry, ProviderRequest};
use crate::redact::SecretScrubber;
use crate::scanner::{self, FileEntry, ScanOptions};
use crate::tokenizer::{build_counter, TokenCounter};
use crate::xml_builder;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Holds only read-only state, so one assembler can serve any number of
/// builds, including concurrent ones on different threads.
pub struct Assembler {
    registry: Arc<ProviderRegistry>,
    counter: Arc<dyn TokenCounter>,
    scan: ScanOptions,
    scrubber: SecretScrubber,
    /// Problems found while setting up (bad secret patterns), repeated in every result.
    setup_diagnostics: Vec<String>,
}

impl Assembler {
    pub fn new(registry: Arc<ProviderRegistry>, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            registry,
            counter,
            scan: ScanOptions::default(),
            scrubber: SecretScrubber::default(),
            setup_diagnostics: Vec::new(),
        }
    }

    /// Built-in providers, counter, scan options and secret patterns from `cfg`.
    pub fn from_config(cfg: &Config) -> Self {
        let registry = Arc::new(ProviderRegistry::with_builtins(&cfg.scan));
        let counter = build_counter(&cfg.token_estimator);
        let (scrubber, errors) = SecretScrubber::new(&cfg.secret_patterns);

        let mut assembler = Self::new(registry, counter)
            .with_scan_options(ScanOptions::from(&cfg.scan))
            .with_scrubber(scrubber);
        assembler.setup_diagnostics = errors.iter().map(|e| e.to_string()).collect();
        assembler
    }

    pub fn with_scan_options(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    pub fn with_scrubber(mut self, scrubber: SecretScrubber) -> Self {
        self.scrubber = scrubber;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn counter(&self) -> &dyn TokenCounter {
        self.counter.as_ref()
    }

    pub fn build(&self, request: &BuildRequest) -> Result<ContextResult> {
        self.build_with_cancel(request, &CancellationToken::new())
    }

    /// Resolve → run providers → dedupe → budget → render → summarize.
    pub fn build_with_cancel(
        &self,
        request: &BuildRequest,
        cancel: &CancellationToken,
    ) -> Result<ContextResult> {
        let mut diagnostics: Vec<String> = self
            .registry
            .diagnostics()
            .iter()
            .chain(self.setup_diagnostics.iter())
            .cloned()
            .collect();

        let providers = self.select_providers(request, &mut diagnostics)?;

        let candidates: Vec<FileEntry> = if providers.iter().any(|p| p.reads_candidates()) {
            let resolution = scanner::resolve(
                &request.roots,
                &request.include_patterns,
                &request.exclude_patterns,
                &self.scan,
                cancel,
            )?;
            diagnostics.extend(resolution.warnings);
            resolution.files
        } else {
            Vec::new()
        };
        debug!(candidates = candidates.len(), "path resolution done");

        let empty = ProviderOptions::new();
        let mut files: Vec<ContextFile> = Vec::new();
        for provider in &providers {
            if cancel.is_cancelled() {
                return Err(AssemblyError::Cancelled);
            }
            let raw = request.provider_options.get(provider.name()).unwrap_or(&empty);
            let options = match provider.options_schema() {
                Some(schema) => {
                    let (options, problems) = coerce_options(provider.name(), &schema, raw);
                    diagnostics.extend(problems);
                    options
                }
                None => raw.clone(),
            };
            let req = ProviderRequest {
                options: &options,
                candidates: &candidates,
                counter: self.counter.as_ref(),
                scrubber: &self.scrubber,
                cancel,
            };
            let produced = provider.collect_files(&req)?;
            debug!(provider = provider.name(), files = produced.files.len(), "provider finished");
            diagnostics.extend(produced.diagnostics);
            files.extend(produced.files);
        }

        let files = dedupe_paths(files, &mut diagnostics);
        let outcome = apply_budget(files, request.token_budget, self.counter.as_ref());

        if cancel.is_cancelled() {
            return Err(AssemblyError::Cancelled);
        }

        let context_xml = xml_builder::render(&request.instructions(), &outcome.included)?;
        let total_tokens = outcome.used_tokens();
        let budget_details = self.summarize(&outcome, request.token_budget, &diagnostics);

        info!(
            included = outcome.included.len(),
            skipped = outcome.skipped.len(),
            total_tokens,
            budget = ?request.token_budget,
            "context assembled"
        );

        Ok(ContextResult {
            context_xml,
            included_files: outcome.included,
            skipped_files: outcome.skipped,
            total_tokens,
            budget_details,
            diagnostics,
        })
    }

    /// Requested providers in request order, defaulting to `files`. Unknown
    /// names are diagnostics unless nothing at all can run.
    fn select_providers(
        &self,
        request: &BuildRequest,
        diagnostics: &mut Vec<String>,
    ) -> Result<Vec<&dyn ContextProvider>> {
        if self.registry.is_empty() {
            return Err(AssemblyError::NoProviders);
        }

        let requested: Vec<String> = if request.providers.is_empty() {
            vec![crate::files::NAME.to_string()]
        } else {
            request.providers.clone()
        };

        let mut seen = HashSet::new();
        let mut selected = Vec::new();
        for name in &requested {
            if !seen.insert(name.as_str()) {
                continue;
            }
            match self.registry.get(name) {
                Some(p) => selected.push(p),
                None => {
                    warn!(provider = %name, "unknown context provider");
                    diagnostics.push(format!("unknown provider '{name}' ignored"));
                }
            }
        }

        if selected.is_empty() {
            return Err(AssemblyError::UnknownProviders {
                requested: requested.clone(),
            });
        }
        Ok(selected)
    }

    fn summarize(
        &self,
        outcome: &BudgetOutcome,
        budget: Option<usize>,
        diagnostics: &[String],
    ) -> String {
        let count = |status: FileStatus| {
            outcome
                .included
                .iter()
                .chain(outcome.skipped.iter())
                .filter(|f| f.status == status)
                .count()
        };

        let used = outcome.used_tokens();
        let budget_line = match (budget, outcome.remaining) {
            (Some(b), Some(r)) => format!("{used} / {b} tokens used, {r} remaining"),
            _ => format!("{used} tokens used, no budget"),
        };

        let mut lines = vec![format!(
            "{} generated, {} truncated, {} skipped, {} error; {}",
            count(FileStatus::Generated),
            count(FileStatus::Truncated),
            count(FileStatus::Skipped),
            count(FileStatus::Error),
            budget_line
        )];
        if self.counter.is_approximate() {
            lines.push(format!("token counts are estimates ({})", self.counter.describe()));
        }
        lines.extend(diagnostics.iter().map(|d| format!("warning: {d}")));
        lines.join("\n")
    }
}

/// The same file reached by two providers keeps its first occurrence.
fn dedupe_paths(files: Vec<ContextFile>, diagnostics: &mut Vec<String>) -> Vec<ContextFile> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut out = Vec::with_capacity(files.len());
    for file in files {
        if seen.insert(file.path.clone()) {
            out.push(file);
        } else {
            debug!(path = %file.display_path(), "duplicate path from another provider dropped");
            diagnostics.push(format!("duplicate path {} dropped", file.display_path()));
        }
    }
    out
}
