//! `git_diff` provider: the working tree (or index) diff as one pseudo-file.

use crate::error::AssemblyError;
use crate::model::{ContextFile, ContextResult};
use crate::provider::{
    ContextProvider, OptionKind, OptionSpec, OptionsSchema, ProviderFiles, ProviderRequest,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{error, info};

pub const NAME: &str = "git_diff";

pub const NO_CHANGES: &str = "<no changes detected>";

pub struct GitDiffProvider;

impl GitDiffProvider {
    fn diff_file(repo: &Path, staged: bool, req: &ProviderRequest<'_>) -> ContextFile {
        let file_name = if staged {
            "git_diff_staged.diff"
        } else {
            "git_diff_unstaged.diff"
        };
        let pseudo_path = repo.join(file_name);

        match run_git_diff(repo, staged) {
            Ok(diff) => {
                let content = if diff.trim().is_empty() {
                    info!(repo = %repo.display(), "no changes detected");
                    NO_CHANGES.to_string()
                } else {
                    diff
                };
                let content = req.scrubber.scrub(&content).into_owned();
                let tokens = req.counter.count_tokens(&content);
                info!(repo = %repo.display(), tokens, "generated diff context");
                ContextFile::generated(pseudo_path, content, tokens)
            }
            Err(msg) => {
                error!(repo = %repo.display(), error = %msg, "git diff failed");
                ContextFile::error(pseudo_path, format!("<error: {msg}>"))
            }
        }
    }
}

fn run_git_diff(repo: &Path, staged: bool) -> Result<String, String> {
    if !repo.join(".git").exists() {
        return Err(format!("{} is not a git repository", repo.display()));
    }

    let mut cmd = Command::new("git");
    cmd.arg("diff").arg("--no-color");
    if staged {
        cmd.arg("--staged");
    }
    let output = cmd.current_dir(repo).output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            "git command not found".to_string()
        } else {
            format!("failed to run git: {e}")
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(if stderr.is_empty() {
            format!("git diff exited with {}", output.status)
        } else {
            stderr
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

impl ContextProvider for GitDiffProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn options_schema(&self) -> Option<OptionsSchema> {
        let mut schema = OptionsSchema::new();
        schema.insert(
            "repo_path".to_string(),
            OptionSpec::new(OptionKind::String, json!("."), "Path to the git repository."),
        );
        schema.insert(
            "staged".to_string(),
            OptionSpec::new(
                OptionKind::Boolean,
                json!(false),
                "Show staged changes instead of unstaged.",
            ),
        );
        Some(schema)
    }

    fn get_context(&self, req: &ProviderRequest<'_>) -> Result<ContextResult, AssemblyError> {
        self.collect_files(req)?.into_result()
    }

    fn collect_files(&self, req: &ProviderRequest<'_>) -> Result<ProviderFiles, AssemblyError> {
        if req.cancel.is_cancelled() {
            return Err(AssemblyError::Cancelled);
        }

        let repo = PathBuf::from(req.str_option("repo_path", "."));
        let staged = req.bool_option("staged", false);
        Ok(ProviderFiles {
            files: vec![Self::diff_file(&repo, staged, req)],
            diagnostics: Vec::new(),
        })
    }
}
