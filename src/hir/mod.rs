//! Symbol-level analysis: indexing the corpus, resolving what a set of
//! entry names needs, and shaping the result into an ordered, pruned bundle.
//!
//! ## Pipeline
//!
//! ```text
//! index    → name → defining module(s), built once per process
//!   ↓
//! resolve  → transitive closure of definitions (+ rename)
//!   ↓
//! graph    → final dependency graph of the bundle text
//!   ↓
//! order    → dependencies first
//!   ↓
//! prune    → drop unreachable definitions and unused imports
//! ```

pub mod diagnostics;
mod graph;
mod index;
mod order;
mod prune;
mod rename;
mod resolve;

pub use diagnostics::{Diagnostic, DiagnosticCollector, Severity};
pub use graph::{DependencyGraph, build_final_graph};
pub use index::{
    CorpusIndex, CorpusIndexer, IndexCache, IndexStats, Location, SymbolIndexEntry, Variant,
};
pub use order::{Ordering, order_definitions, reorder_bundle};
pub use prune::{PruneOutcome, prune_dead_code, prune_imports};
pub use rename::{RenameMap, rename_definition_header, rewrite_ranges};
pub use resolve::{DefinitionRecord, DiscoveryGraph, Resolution, Resolver, locate_source};
