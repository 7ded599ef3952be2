//! # subgraph-compiler
//!
//! Compiles a subgraph of Python node classes into one self-contained
//! source file: every definition the nodes transitively need, inlined,
//! ordered and pruned, followed by a generated wrapper class.
//!
//! ## Module Structure (dependency order)
//!
//! ```text
//! bundle   → execution plans, wrapper generation, the Compiler
//!   ↓
//! hir      → corpus index, resolution, final graph, ordering, pruning
//!   ↓
//! project  → corpus discovery and file caching
//!   ↓
//! syntax   → tree-sitter Python parsing and scanning
//!   ↓
//! base     → Primitives (FileId, ModulePath, TextRange)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use subgraph::{BundlerConfig, Compiler, IndexCache, StaticRegistry};
//!
//! let config = BundlerConfig::for_root("/opt/ComfyUI").with_known_collisions(["Util"]);
//! let registry = StaticRegistry::scan_corpus(&config)?;
//! let cache = IndexCache::new();
//!
//! let compiler = Compiler::new(&config, &cache, &registry);
//! let plan = r#"{
//!     "newClassName": "My Pipeline",
//!     "executionOrder": [{ "id": 1, "class_name": "CheckpointLoaderSimple", "title": "Load" }]
//! }"#;
//! let bundle = compiler.compile_json(plan)?;
//! println!("{}", bundle.source);
//! # Ok::<(), subgraph::BundleError>(())
//! ```

// ============================================================================
// FOUNDATION
// ============================================================================

/// Foundation types: FileId, ModulePath, TextRange
pub mod base;

pub mod config;
pub mod error;

// ============================================================================
// ANALYSIS
// ============================================================================

/// Python syntax: parsing, definitions, imports, references
pub mod syntax;

/// Corpus file discovery and caching
pub mod project;

/// Symbol index, resolver and the bundle-shaping passes
pub mod hir;

// ============================================================================
// GENERATION
// ============================================================================

pub mod bundle;

// Re-export commonly needed items
pub use bundle::{
    CompiledBundle, Compiler, ExecutionPlan, NodeRegistry, NodeSource, NodeSpec, StaticRegistry,
};
pub use config::BundlerConfig;
pub use error::{BundleError, Result};
pub use hir::{CorpusIndex, CorpusIndexer, Diagnostic, IndexCache, Resolution, Resolver, Severity};

// Re-export new foundation types
pub use base::{FileId, LineCol, ModulePath, TextRange, TextSize};
