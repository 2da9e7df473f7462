//! The built-in `files` provider: reads resolved candidates as text.

use crate::config::ScanConfig;
use crate::error::AssemblyError;
use crate::model::{ContextFile, ContextResult};
use crate::provider::{ContextProvider, ProviderFiles, ProviderRequest};
use crate::scanner::FileEntry;
use rayon::prelude::*;
use std::borrow::Cow;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

pub const NAME: &str = "files";

pub const NOT_UTF8_PLACEHOLDER: &str = "<error: file is not valid UTF-8 text>";

pub struct FileProvider {
    max_file_bytes: u64,
    /// Lowercase, without the leading dot.
    binary_extensions: HashSet<String>,
}

impl FileProvider {
    pub fn new() -> Self {
        Self::from_config(&ScanConfig::default())
    }

    pub fn from_config(scan: &ScanConfig) -> Self {
        Self {
            max_file_bytes: scan.max_file_bytes,
            binary_extensions: scan
                .binary_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    fn is_binary(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.binary_extensions.contains(&e.to_ascii_lowercase()))
    }

    /// Turn one candidate into a `ContextFile`. Never fails: read problems
    /// become an `error` entry with a placeholder.
    fn load(&self, entry: &FileEntry, req: &ProviderRequest<'_>) -> ContextFile {
        if self.is_binary(&entry.path) {
            debug!(path = %entry.rel_path, "skipping binary file");
            return ContextFile::skipped(&entry.path);
        }
        if entry.bytes > self.max_file_bytes {
            debug!(path = %entry.rel_path, bytes = entry.bytes, "skipping oversized file");
            return ContextFile::skipped(&entry.path);
        }

        let bytes = match std::fs::read(&entry.path) {
            Ok(b) => b,
            Err(err) => {
                warn!(path = %entry.path.display(), error = %err, "cannot read file");
                return ContextFile::error(&entry.path, format!("<error: {err}>"));
            }
        };
        let text = match String::from_utf8(bytes) {
            Ok(t) => t,
            Err(_) => {
                warn!(path = %entry.path.display(), "file is not valid UTF-8");
                return ContextFile::error(&entry.path, NOT_UTF8_PLACEHOLDER);
            }
        };

        let scrubbed = match req.scrubber.scrub(&text) {
            Cow::Owned(s) => Some(s),
            Cow::Borrowed(_) => None,
        };
        let text = match scrubbed {
            Some(s) => {
                info!(path = %entry.rel_path, "redacted secrets");
                s
            }
            None => text,
        };
        let tokens = req.counter.count_tokens(&text);
        ContextFile::generated(&entry.path, text, tokens)
    }
}

impl Default for FileProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextProvider for FileProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn reads_candidates(&self) -> bool {
        true
    }

    fn get_context(&self, req: &ProviderRequest<'_>) -> Result<ContextResult, AssemblyError> {
        self.collect_files(req)?.into_result()
    }

    fn collect_files(&self, req: &ProviderRequest<'_>) -> Result<ProviderFiles, AssemblyError> {
        if req.cancel.is_cancelled() {
            return Err(AssemblyError::Cancelled);
        }

        // Indexed parallel map keeps candidate order. Once cancelled, the
        // remaining candidates are not read.
        let loaded: Vec<Option<ContextFile>> = req
            .candidates
            .par_iter()
            .map(|entry| {
                if req.cancel.is_cancelled() {
                    None
                } else {
                    Some(self.load(entry, req))
                }
            })
            .collect();

        if req.cancel.is_cancelled() {
            return Err(AssemblyError::Cancelled);
        }

        let files: Vec<ContextFile> = loaded.into_iter().flatten().collect();
        debug!(files = files.len(), "files loaded");
        Ok(ProviderFiles {
            files,
            diagnostics: Vec::new(),
        })
    }
}
