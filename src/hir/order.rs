//! Define-before-use ordering of bundle definitions.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::warn;

use super::graph::DependencyGraph;
use crate::error::Result;
use crate::syntax::{BundleLayout, LayoutItem, PythonParser};

/// The order definitions are emitted in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ordering {
    /// Dependencies first.
    pub names: Vec<SmolStr>,
    /// A node on a cycle, when the graph had one and discovery order was
    /// used instead.
    pub cycle: Option<SmolStr>,
}

impl Ordering {
    pub fn has_cycle(&self) -> bool {
        self.cycle.is_some()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Order the nodes of `graph` so every definition follows what it depends on.
///
/// On a cycle the graph's node order (discovery order) is returned
/// unchanged and the cycle is reported through [`Ordering::cycle`].
pub fn order_definitions(graph: &DependencyGraph) -> Ordering {
    let mut dag = DiGraph::<SmolStr, ()>::new();
    let mut node_map: FxHashMap<&SmolStr, NodeIndex> = FxHashMap::default();

    for name in graph.nodes() {
        node_map.insert(name, dag.add_node(name.clone()));
    }
    for (from, to) in graph.edges() {
        if let (Some(&from), Some(&to)) = (node_map.get(from), node_map.get(to)) {
            // Edge from symbol to its dependency
            dag.add_edge(from, to, ());
        }
    }

    match toposort(&dag, None) {
        Ok(sorted) => Ordering {
            // Reverse so dependencies come first
            names: sorted.into_iter().rev().map(|idx| dag[idx].clone()).collect(),
            cycle: None,
        },
        Err(cycle) => {
            let name = dag[cycle.node_id()].clone();
            warn!(name = %name, "dependency cycle, keeping discovery order");
            Ordering {
                names: graph.nodes().cloned().collect(),
                cycle: Some(name),
            }
        }
    }
}

/// Rearrange the top-level items of `text` into `ordering`.
///
/// The preamble stays first. Items the ordering does not mention keep their
/// relative order after the ordered ones.
pub fn reorder_bundle(
    parser: &mut PythonParser,
    text: &str,
    ordering: &Ordering,
) -> Result<String> {
    let layout = BundleLayout::parse(parser, text)?;

    let mut by_name: FxHashMap<&str, &LayoutItem> = FxHashMap::default();
    for item in &layout.items {
        by_name.entry(item.definition.name.as_str()).or_insert(item);
    }

    let mut emitted: Vec<&LayoutItem> = Vec::with_capacity(layout.items.len());
    for name in &ordering.names {
        if let Some(item) = by_name.remove(name.as_str()) {
            emitted.push(item);
        }
    }
    for item in &layout.items {
        if by_name.remove(item.definition.name.as_str()).is_some() {
            emitted.push(item);
        }
    }

    Ok(layout.render(emitted))
}
