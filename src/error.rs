//! Errors raised while indexing, resolving and assembling a bundle.
//!
//! Most variants describe a per-symbol or per-phase failure that the engine
//! recovers from: they are logged, recorded as diagnostics and the bundle is
//! produced anyway. Only [`BundleError::is_fatal`] errors abort a request.

use std::path::PathBuf;

use smol_str::SmolStr;
use thiserror::Error;

use crate::base::ModulePath;

#[derive(Debug, Error)]
pub enum BundleError {
    /// The symbol is absent from both indexes.
    #[error("symbol '{name}' not found in the corpus index")]
    NotFound { name: SmolStr },

    /// The module has no Python source to inline (native, compiled or missing).
    #[error("module '{module}' has no inlinable source ({reason})")]
    UnresolvableSource { module: ModulePath, reason: &'static str },

    /// Source text could not be parsed.
    #[error("failed to parse {origin}")]
    ParseFailure { origin: String },

    /// The definition was expected in a file but is not there.
    #[error("definition '{name}' not found in {path}")]
    MissingDefinition { name: SmolStr, path: PathBuf },

    /// The final graph has a cycle; discovery order was used instead.
    #[error("dependency cycle detected through '{name}'")]
    CycleDetected { name: SmolStr },

    /// The final graph could not be built; pruning was disabled.
    #[error("final dependency graph unavailable, pruning disabled")]
    GraphUnavailable,

    /// No bundle definition is instantiated by the wrapper; pruning was disabled.
    #[error("no entry points found in the generated wrapper, pruning disabled")]
    NoEntryPoints,

    /// A plan node names an operation the registry does not know.
    #[error("node class '{class_name}' is not registered")]
    UnknownNode { class_name: String },

    /// The execution plan is malformed.
    #[error("invalid execution plan: {0}")]
    InvalidPlan(String),

    #[error("failed to decode execution plan")]
    Json(#[from] serde_json::Error),

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("python grammar could not be loaded")]
    Language(#[from] tree_sitter::LanguageError),
}

impl BundleError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse_failure(origin: impl Into<String>) -> Self {
        Self::ParseFailure {
            origin: origin.into(),
        }
    }

    /// Whether this error must fail the whole request instead of degrading it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownNode { .. }
                | Self::InvalidPlan(_)
                | Self::Json(_)
                | Self::Language(_)
        )
    }
}

pub type Result<T, E = BundleError> = std::result::Result<T, E>;
