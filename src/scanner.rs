//! Path resolution: roots + include/exclude globs → ordered, deduplicated files.
//!
//! Patterns are matched against the path relative to its root with `/`
//! separators. `*` and `?` stay within one path segment; only `**` spans
//! directories. Exclude always wins over include.

use crate::cancel::CancellationToken;
use crate::error::{AssemblyError, PatternError};
use crate::model::display_path;
use glob::{MatchOptions, Pattern};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compiled include/exclude patterns.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    /// Set when no include patterns were given at all (as opposed to all of them being malformed).
    match_all: bool,
}

impl PathFilter {
    /// Compile patterns. Malformed ones are dropped and returned as errors.
    pub fn new(include: &[String], exclude: &[String]) -> (Self, Vec<PatternError>) {
        let mut errors = Vec::new();
        let include_pats = compile(include, &mut errors);
        let exclude_pats = compile(exclude, &mut errors);
        let filter = Self {
            include: include_pats,
            exclude: exclude_pats,
            match_all: include.is_empty(),
        };
        (filter, errors)
    }

    pub fn is_excluded(&self, rel_path: &str) -> bool {
        self.exclude
            .iter()
            .any(|p| p.matches_with(rel_path, MATCH_OPTIONS))
    }

    pub fn is_included(&self, rel_path: &str) -> bool {
        self.match_all
            || self
                .include
                .iter()
                .any(|p| p.matches_with(rel_path, MATCH_OPTIONS))
    }

    /// Candidate iff included and not excluded.
    pub fn is_candidate(&self, rel_path: &str) -> bool {
        !self.is_excluded(rel_path) && self.is_included(rel_path)
    }

    /// True when an exclude pattern of the form `P/**` has `P` matching the
    /// directory, so nothing below it can ever be a candidate.
    fn prunes_dir(&self, rel_dir: &str) -> bool {
        if rel_dir.is_empty() {
            return false;
        }
        self.exclude.iter().any(|p| {
            p.as_str()
                .strip_suffix("/**")
                .and_then(|prefix| Pattern::new(prefix).ok())
                .is_some_and(|prefix| prefix.matches_with(rel_dir, MATCH_OPTIONS))
        })
    }
}

fn compile(patterns: &[String], errors: &mut Vec<PatternError>) -> Vec<Pattern> {
    let mut out = Vec::with_capacity(patterns.len());
    for raw in patterns {
        let normalized = raw.trim().replace('\\', "/");
        match Pattern::new(&normalized) {
            Ok(p) => out.push(p),
            Err(err) => {
                warn!(pattern = %raw, error = %err, "dropping malformed glob pattern");
                errors.push(PatternError {
                    pattern: raw.clone(),
                    message: err.msg.to_string(),
                });
            }
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub follow_symlinks: bool,
    pub respect_gitignore: bool,
    pub include_hidden: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: true,
            respect_gitignore: false,
            include_hidden: true,
        }
    }
}

impl From<&crate::config::ScanConfig> for ScanOptions {
    fn from(cfg: &crate::config::ScanConfig) -> Self {
        Self {
            follow_symlinks: cfg.follow_symlinks,
            respect_gitignore: cfg.respect_gitignore,
            include_hidden: cfg.include_hidden,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path as presented to the user: `root.join(rel_path)`.
    pub path: PathBuf,
    /// Relative to the root, `/`-separated; what patterns are matched against.
    pub rel_path: String,
    /// Canonical path, used to detect the same file reached twice.
    pub real_path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub files: Vec<FileEntry>,
    /// Unreadable directories, symlink loops, malformed patterns.
    pub warnings: Vec<String>,
}

/// Expand `roots` into candidate files.
///
/// Roots are processed in the given order; within a root files are ordered by
/// relative path (component-wise, which matches a lexicographic walk). A file
/// reached twice (overlapping roots, symlinks) keeps its first occurrence.
///
/// Fails only when every root is unreadable, or on cancellation.
pub fn resolve(
    roots: &[PathBuf],
    include: &[String],
    exclude: &[String],
    opts: &ScanOptions,
    cancel: &CancellationToken,
) -> Result<Resolution, AssemblyError> {
    let (filter, pattern_errors) = PathFilter::new(include, exclude);
    let mut out = Resolution {
        files: Vec::new(),
        warnings: pattern_errors.iter().map(|e| e.to_string()).collect(),
    };

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut unreadable: Vec<PathBuf> = Vec::new();

    for root in roots {
        if cancel.is_cancelled() {
            return Err(AssemblyError::Cancelled);
        }

        let meta = match std::fs::metadata(root) {
            Ok(m) => m,
            Err(err) => {
                warn!(root = %root.display(), error = %err, "root is not readable");
                out.warnings
                    .push(format!("root {} is not readable: {err}", root.display()));
                unreadable.push(root.clone());
                continue;
            }
        };

        let mut entries = if meta.is_file() {
            scan_single_file(root, meta.len(), &filter)
        } else {
            match scan_root(root, &filter, opts, cancel, &mut out.warnings) {
                Some(entries) => entries,
                None => {
                    unreadable.push(root.clone());
                    continue;
                }
            }
        };

        if cancel.is_cancelled() {
            return Err(AssemblyError::Cancelled);
        }

        entries.sort_by(|a, b| Path::new(&a.rel_path).cmp(Path::new(&b.rel_path)));
        for entry in entries {
            if seen.insert(entry.real_path.clone()) {
                out.files.push(entry);
            } else {
                debug!(path = %entry.path.display(), "dropping duplicate path");
            }
        }
    }

    if !roots.is_empty() && unreadable.len() == roots.len() {
        return Err(AssemblyError::NoReadableRoots { roots: unreadable });
    }

    debug!(files = out.files.len(), warnings = out.warnings.len(), "resolved candidate files");
    Ok(out)
}

/// Walk one directory root. `None` when the root itself cannot be listed.
fn scan_root(
    root: &Path,
    filter: &PathFilter,
    opts: &ScanOptions,
    cancel: &CancellationToken,
    warnings: &mut Vec<String>,
) -> Option<Vec<FileEntry>> {
    if let Err(err) = std::fs::read_dir(root) {
        warn!(root = %root.display(), error = %err, "cannot list root directory");
        warnings.push(format!("root {} cannot be listed: {err}", root.display()));
        return None;
    }

    let prune_filter = filter.clone();
    let prune_root = root.to_path_buf();
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(!opts.include_hidden)
        .git_ignore(opts.respect_gitignore)
        .git_global(opts.respect_gitignore)
        .git_exclude(opts.respect_gitignore)
        .ignore(opts.respect_gitignore)
        .parents(opts.respect_gitignore)
        .follow_links(opts.follow_symlinks)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |e| {
            let is_dir = e.file_type().is_some_and(|t| t.is_dir());
            if !is_dir {
                return true;
            }
            let rel = relative(e.path(), &prune_root);
            !prune_filter.prunes_dir(&rel)
        })
        .build();

    let mut entries = Vec::new();
    for item in walker {
        if cancel.is_cancelled() {
            break;
        }

        let dent = match item {
            Ok(d) => d,
            Err(err) => {
                // Unreadable directories and symlink loops land here; keep walking.
                warn!(root = %root.display(), error = %err, "skipping unreadable entry");
                warnings.push(format!("skipped while scanning {}: {err}", root.display()));
                continue;
            }
        };

        if !dent.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let rel_path = relative(dent.path(), root);
        if !filter.is_candidate(&rel_path) {
            trace!(path = %rel_path, "filtered out");
            continue;
        }

        let bytes = match dent.metadata() {
            Ok(m) => m.len(),
            Err(err) => {
                warn!(path = %dent.path().display(), error = %err, "cannot stat file");
                warnings.push(format!("cannot stat {}: {err}", dent.path().display()));
                continue;
            }
        };

        let path = dent.into_path();
        let real_path = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        entries.push(FileEntry {
            path,
            rel_path,
            real_path,
            bytes,
        });
    }

    Some(entries)
}

fn scan_single_file(path: &Path, bytes: u64, filter: &PathFilter) -> Vec<FileEntry> {
    let rel_path = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| display_path(path));
    if !filter.is_candidate(&rel_path) {
        return vec![];
    }
    let real_path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    vec![FileEntry {
        path: path.to_path_buf(),
        rel_path,
        real_path,
        bytes,
    }]
}

fn relative(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    display_path(rel)
}
