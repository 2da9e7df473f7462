//! Error kinds for context assembly.
//!
//! Only [`AssemblyError`] aborts a build. Registry and pattern errors are
//! configuration problems: they are logged, recorded as diagnostics and the
//! offending provider or pattern is dropped.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("no context providers are registered")]
    NoProviders,

    #[error("none of the requested providers are registered: {}", requested.join(", "))]
    UnknownProviders { requested: Vec<String> },

    #[error("none of the roots could be read: {}", display_roots(roots))]
    NoReadableRoots { roots: Vec<PathBuf> },

    #[error("context assembly cancelled")]
    Cancelled,

    #[error("failed to render context XML: {0}")]
    Render(#[from] quick_xml::Error),

    #[error("rendered context XML is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

fn display_roots(roots: &[PathBuf]) -> String {
    roots
        .iter()
        .map(|r| r.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("provider name '{name}' is already registered")]
    DuplicateName { name: String },

    #[error("provider name must not be empty")]
    EmptyName,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pattern '{pattern}': {message}")]
pub struct PatternError {
    pub pattern: String,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, AssemblyError>;
