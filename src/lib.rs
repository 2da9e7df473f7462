//! Assemble reproducible, token-budgeted LLM prompts from local repositories.
//!
//! A build resolves paths, runs one or more [`provider::ContextProvider`]s,
//! enforces the token budget and renders an escaped XML document. Front ends
//! construct a [`BuildRequest`] and call [`Assembler::build`].

pub mod assembler;
pub mod budget;
pub mod cancel;
pub mod config;
pub mod error;
pub mod files;
pub mod git_diff;
pub mod logging;
pub mod model;
pub mod provider;
pub mod redact;
pub mod scanner;
pub mod tokenizer;
pub mod xml_builder;

pub use assembler::Assembler;
pub use cancel::CancellationToken;
pub use config::{load_config, Config};
pub use error::{AssemblyError, PatternError, RegistryError};
pub use model::{BuildRequest, ContextFile, ContextResult, FileStatus, Snippet};
pub use provider::{ContextProvider, ProviderFiles, ProviderRegistry, ProviderRequest};
pub use tokenizer::{HeuristicCounter, TokenCounter};
