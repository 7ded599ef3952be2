//! Diagnostics for what went wrong while building a bundle, without failing it.
//!
//! Per-symbol and per-phase failures are recovered from. Each one is turned
//! into a [`Diagnostic`] so the caller can report why a definition is missing
//! or why pruning was skipped.

use std::path::PathBuf;
use std::sync::Arc;

use smol_str::SmolStr;

use crate::error::BundleError;

// ============================================================================
// DIAGNOSTIC TYPES
// ============================================================================

/// Severity level of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A diagnostic message attached to a symbol or file.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable code (e.g., "B0001").
    pub code: &'static str,
    pub message: Arc<str>,
    /// The symbol being processed, if any.
    pub symbol: Option<SmolStr>,
    /// The file involved, if any.
    pub path: Option<PathBuf>,
}

impl Diagnostic {
    pub fn warning(code: &'static str, message: impl Into<Arc<str>>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            symbol: None,
            path: None,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<SmolStr>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Describe a recovered [`BundleError`].
    ///
    /// Skipped phases are informational; lost symbols are warnings; anything
    /// that would have been fatal is an error.
    pub fn from_error(error: &BundleError) -> Self {
        let (severity, code) = match error {
            BundleError::NotFound { .. } => (Severity::Warning, codes::NOT_FOUND),
            BundleError::UnresolvableSource { .. } => (Severity::Info, codes::UNRESOLVABLE_SOURCE),
            BundleError::ParseFailure { .. } => (Severity::Warning, codes::PARSE_FAILURE),
            BundleError::MissingDefinition { .. } => (Severity::Warning, codes::MISSING_DEFINITION),
            BundleError::CycleDetected { .. } => (Severity::Warning, codes::CYCLE_DETECTED),
            BundleError::GraphUnavailable => (Severity::Info, codes::GRAPH_UNAVAILABLE),
            BundleError::NoEntryPoints => (Severity::Info, codes::NO_ENTRY_POINTS),
            BundleError::Io { .. } => (Severity::Warning, codes::IO),
            _ => (Severity::Error, codes::FATAL),
        };
        let mut diag = Self {
            severity,
            code,
            message: Arc::from(error_chain(error)),
            symbol: None,
            path: None,
        };
        match error {
            BundleError::NotFound { name }
            | BundleError::CycleDetected { name } => diag.symbol = Some(name.clone()),
            BundleError::MissingDefinition { name, path } => {
                diag.symbol = Some(name.clone());
                diag.path = Some(path.clone());
            }
            BundleError::Io { path, .. } => diag.path = Some(path.clone()),
            _ => {}
        }
        diag
    }
}

/// The error message followed by its sources, `: `-separated.
fn error_chain(error: &BundleError) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

// ============================================================================
// DIAGNOSTIC CODES
// ============================================================================

/// Standard diagnostic codes.
pub mod codes {
    /// Symbol absent from the index.
    pub const NOT_FOUND: &str = "B0001";
    /// Module is native, compiled or missing; treated as external.
    pub const UNRESOLVABLE_SOURCE: &str = "B0002";
    /// Source text did not parse.
    pub const PARSE_FAILURE: &str = "B0003";
    /// Indexed definition no longer present in its file.
    pub const MISSING_DEFINITION: &str = "B0004";
    /// Ordering fell back to discovery order.
    pub const CYCLE_DETECTED: &str = "B0005";
    /// Final graph unavailable; nothing pruned.
    pub const GRAPH_UNAVAILABLE: &str = "B0006";
    /// Wrapper instantiates no bundle definition; nothing pruned.
    pub const NO_ENTRY_POINTS: &str = "B0007";
    /// File could not be read.
    pub const IO: &str = "B0008";
    /// Request-level failure.
    pub const FATAL: &str = "E0001";
}

// ============================================================================
// DIAGNOSTIC COLLECTOR
// ============================================================================

/// Collects diagnostics during one bundling request.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Record a recovered error, attributing it to `symbol` when the error
    /// itself does not name one.
    pub fn record(&mut self, error: &BundleError, symbol: Option<&str>) {
        let mut diag = Diagnostic::from_error(error);
        if diag.symbol.is_none() {
            diag.symbol = symbol.map(SmolStr::new);
        }
        self.add(diag);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Diagnostics carrying `code`.
    pub fn with_code(&self, code: &str) -> Vec<&Diagnostic> {
        self.diagnostics.iter().filter(|d| d.code == code).collect()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Warning).count()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    /// Take all diagnostics, leaving the collector empty.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}
