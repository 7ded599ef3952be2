//! Pruning: dropping definitions and imports the artifact never uses.

use std::collections::BTreeSet;

use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use tracing::{debug, info};

use super::graph::DependencyGraph;
use crate::error::BundleError;
use crate::syntax::{BundleLayout, ImportKind, ImportStatement, PythonParser, referenced_names};

// ============================================================================
// DEAD CODE
// ============================================================================

/// Result of dead code pruning.
#[derive(Debug)]
pub enum PruneOutcome {
    /// Unreachable definitions were removed (possibly none).
    Pruned { text: String, removed: Vec<SmolStr> },
    /// Pruning was not possible; the text is unchanged.
    Skipped { text: String, reason: BundleError },
}

impl PruneOutcome {
    pub fn text(&self) -> &str {
        match self {
            Self::Pruned { text, .. } | Self::Skipped { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Pruned { text, .. } | Self::Skipped { text, .. } => text,
        }
    }

    pub fn removed(&self) -> &[SmolStr] {
        match self {
            Self::Pruned { removed, .. } => removed,
            Self::Skipped { .. } => &[],
        }
    }

    pub fn skip_reason(&self) -> Option<&BundleError> {
        match self {
            Self::Pruned { .. } => None,
            Self::Skipped { reason, .. } => Some(reason),
        }
    }
}

/// Remove every top-level definition of `text` not reachable from
/// `entry_points` in `graph`.
///
/// Entry points that are not bundle definitions are ignored. Without a graph
/// or without a single valid entry point nothing is removed. Surviving
/// definitions keep their relative order.
pub fn prune_dead_code(
    parser: &mut PythonParser,
    text: &str,
    graph: Option<&DependencyGraph>,
    entry_points: &[SmolStr],
) -> PruneOutcome {
    let skipped = |reason| PruneOutcome::Skipped {
        text: text.to_string(),
        reason,
    };

    let Some(graph) = graph else {
        return skipped(BundleError::GraphUnavailable);
    };
    let roots: Vec<&str> = entry_points
        .iter()
        .map(SmolStr::as_str)
        .filter(|name| graph.contains(name))
        .collect();
    if roots.is_empty() {
        return skipped(BundleError::NoEntryPoints);
    }

    let layout = match BundleLayout::parse(parser, text) {
        Ok(layout) => layout,
        Err(err) => return skipped(err),
    };
    let reachable = graph.reachable_from(roots);

    let (kept, dropped): (Vec<_>, Vec<_>) = layout
        .items
        .iter()
        .partition(|item| reachable.contains(&item.definition.name));
    let removed: Vec<SmolStr> = dropped.iter().map(|item| item.definition.name.clone()).collect();

    if !removed.is_empty() {
        info!(
            kept = kept.len(),
            removed = removed.len(),
            "pruned unreachable definitions"
        );
        debug!(removed = ?removed, "unreachable definitions");
    }

    PruneOutcome::Pruned {
        text: layout.render(kept),
        removed,
    }
}

// ============================================================================
// IMPORTS
// ============================================================================

/// Keep the imports of `imports` that bind a name used in `text`.
///
/// `from __future__` and star imports are always kept. Imports of a module
/// whose root is in `always_ignored` are always dropped. When `text` does
/// not parse, every import not ignored is kept.
pub fn prune_imports(
    parser: &mut PythonParser,
    text: &str,
    imports: &BTreeSet<String>,
    always_ignored: &FxHashSet<SmolStr>,
) -> BTreeSet<String> {
    let used: Option<FxHashSet<SmolStr>> = match parser.parse(text, "bundle") {
        Ok(tree) => Some(referenced_names(&tree).into_iter().collect()),
        Err(err) => {
            debug!(error = %err, "bundle text does not parse, keeping all imports");
            None
        }
    };

    let mut kept = BTreeSet::new();
    for import in imports {
        let Some(statement) = parse_import(parser, import) else {
            // Not understood; keep it rather than break the artifact.
            kept.insert(import.clone());
            continue;
        };
        if statement.roots.iter().any(|root| always_ignored.contains(root)) {
            continue;
        }
        let keep = match (&used, statement.kind) {
            (_, ImportKind::Future | ImportKind::Star) => true,
            (None, _) => true,
            (Some(used), _) => statement.bindings.iter().any(|b| used.contains(b)),
        };
        if keep {
            kept.insert(import.clone());
        }
    }

    debug!(kept = kept.len(), total = imports.len(), "pruned imports");
    kept
}

fn parse_import(parser: &mut PythonParser, import: &str) -> Option<ImportStatement> {
    let tree = parser.parse(import, "import").ok()?;
    tree.imports().into_iter().next()
}
