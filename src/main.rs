use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use promptweave::config::{load_config, Config};
use promptweave::logging::init_logging;
use promptweave::model::{display_path, BuildRequest, Snippet};
use promptweave::provider::ProviderRegistry;
use promptweave::{Assembler, CancellationToken};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "promptweave")]
#[command(version)]
#[command(about = "Assemble token-budgeted LLM prompts from local repositories")]
struct Cli {
    /// Directory or file to collect from (repeatable). Defaults to the current directory.
    #[arg(long, short = 'r', value_name = "PATH")]
    root: Vec<PathBuf>,

    /// Only include paths matching this glob (repeatable)
    #[arg(long, short = 'i', value_name = "GLOB")]
    include: Vec<String>,

    /// Exclude paths matching this glob (repeatable); always wins over --include
    #[arg(long, short = 'e', value_name = "GLOB")]
    exclude: Vec<String>,

    /// Where to write the XML document; `-` writes to stdout
    #[arg(long, short = 'o', default_value = "prompt.xml")]
    output: PathBuf,

    /// Print the XML document to stdout instead of writing a file
    #[arg(long)]
    stdout: bool,

    /// Token budget override
    #[arg(long, value_name = "N", conflicts_with = "no_budget")]
    max_tokens: Option<usize>,

    /// Disable the token budget entirely
    #[arg(long)]
    no_budget: bool,

    /// Library snippet to include, e.g. `objective=review` (repeatable)
    #[arg(long, value_name = "CATEGORY=NAME")]
    snippet: Vec<String>,

    /// Inline instruction, e.g. `objective=Find the race` (repeatable)
    #[arg(long, value_name = "CATEGORY=TEXT")]
    custom: Vec<String>,

    /// Follow-up question: free text, or the 1-based index of a configured question
    #[arg(long, value_name = "TEXT")]
    question: Vec<String>,

    /// Context provider to run, in order (repeatable). Defaults to `files`.
    #[arg(long, value_name = "NAME")]
    provider: Vec<String>,

    /// Provider option, e.g. `git_diff.staged=true` (repeatable)
    #[arg(long, value_name = "PROVIDER.KEY=VALUE")]
    provider_option: Vec<String>,

    /// Config file (JSON or TOML); otherwise looked up in the first root and the user config dir
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print registered providers and their option schemas as JSON, then exit
    #[arg(long)]
    list_providers: bool,

    /// Do not append the configured default exclude globs
    #[arg(long)]
    no_default_excludes: bool,

    /// Debug-level logging for this crate
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cwd = std::env::current_dir().context("Failed to get current dir")?;
    let roots: Vec<PathBuf> = if cli.root.is_empty() {
        vec![cwd.clone()]
    } else {
        cli.root.clone()
    };

    let cfg = load_config(&roots[0], cli.config.as_deref());

    if cli.list_providers {
        let registry = ProviderRegistry::with_builtins(&cfg.scan);
        println!("{}", serde_json::to_string_pretty(&registry.schemas())?);
        return Ok(());
    }

    let to_stdout = cli.stdout || cli.output.as_os_str() == "-";
    let request = build_request(&cli, &cfg, roots, (!to_stdout).then(|| cwd.join(&cli.output)))?;

    let assembler = Assembler::from_config(&cfg);
    let cancel = CancellationToken::new();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner.set_message("assembling context...");

    let worker = std::thread::spawn(move || assembler.build_with_cancel(&request, &cancel));
    let joined = worker.join();
    spinner.finish_and_clear();
    let result = joined.map_err(|_| anyhow!("build worker panicked"))??;

    if to_stdout {
        print!("{}", result.context_xml);
    } else {
        std::fs::write(&cli.output, &result.context_xml)
            .with_context(|| format!("Failed to write {}", cli.output.display()))?;
        info!(path = %cli.output.display(), bytes = result.context_xml.len(), "wrote prompt");
    }

    info!(
        total_tokens = result.total_tokens,
        included = result.included_files.len(),
        skipped = result.skipped_files.len(),
        "build summary"
    );
    for line in result.budget_details.lines() {
        info!("{line}");
    }

    Ok(())
}

/// Map CLI flags and config onto a `BuildRequest`.
fn build_request(
    cli: &Cli,
    cfg: &Config,
    roots: Vec<PathBuf>,
    output: Option<PathBuf>,
) -> Result<BuildRequest> {
    let mut exclude = cli.exclude.clone();
    if !cli.no_default_excludes {
        exclude.extend(cfg.scan.ignore_patterns.iter().cloned());
    }
    // Never feed a previous run's output back in.
    if let Some(out) = output.as_deref() {
        exclude.extend(roots.iter().filter_map(|r| output_exclude(r, out)));
    }

    let mut selected_snippets = Vec::new();
    for raw in &cli.snippet {
        let (category, name) = split_pair(raw, '=')?;
        match cfg.snippet_text(category, name) {
            Some(text) => selected_snippets.push(Snippet::new(category.to_lowercase(), text)),
            None => warn!(snippet = %raw, "unknown library snippet ignored"),
        }
    }
    for raw in &cli.custom {
        let (category, text) = split_pair(raw, '=')?;
        selected_snippets.push(Snippet::new(category, text));
    }

    let questions = cli.question.iter().map(|q| resolve_question(q, cfg)).collect();

    let mut request = BuildRequest {
        roots,
        include_patterns: cli.include.clone(),
        exclude_patterns: exclude,
        token_budget: if cli.no_budget {
            None
        } else {
            cli.max_tokens.or(cfg.max_context_tokens)
        },
        selected_snippets,
        questions,
        providers: cli.provider.clone(),
        ..BuildRequest::default()
    };

    for raw in &cli.provider_option {
        let (target, value) = split_pair(raw, '=')?;
        let (provider, key) = split_pair(target, '.')?;
        request = request.provider_option(provider, key, parse_option_value(value));
    }

    Ok(request)
}

fn split_pair(raw: &str, sep: char) -> Result<(&str, &str)> {
    match raw.split_once(sep) {
        Some((a, b)) if !a.trim().is_empty() => Ok((a.trim(), b)),
        _ => bail!("expected '{sep}' in '{raw}'"),
    }
}

/// `true`, `42`, `"x"` parse as JSON; anything else is taken as a plain string.
fn parse_option_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// A 1-based index or exact text selects a configured question; other text is used as given.
fn resolve_question(raw: &str, cfg: &Config) -> String {
    if let Ok(n) = raw.trim().parse::<usize>() {
        if let Some(q) = n.checked_sub(1).and_then(|i| cfg.questions.get(i)) {
            return q.clone();
        }
    }
    raw.to_string()
}

/// Exclude glob for `output` when it lies inside directory `root`.
fn output_exclude(root: &Path, output: &Path) -> Option<String> {
    let root = std::fs::canonicalize(root).ok()?;
    let parent = std::fs::canonicalize(output.parent()?).ok()?;
    let rel = parent.join(output.file_name()?);
    let rel = rel.strip_prefix(&root).ok()?;
    Some(glob::Pattern::escape(&display_path(rel)))
}
