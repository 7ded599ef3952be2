//! The final dependency graph, rebuilt from the bundle text as emitted.
//!
//! Resolution records what it saw while walking the corpus, but renames,
//! call-site rewrites and patches change the text afterwards. Ordering and
//! pruning therefore work from this graph, which only ever looks at the
//! bundle itself.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use tracing::debug;

use crate::base::TextSize;
use crate::syntax::{PythonParser, SourceTree, references};

/// Edges `A → B` meaning "A depends on B", keyed by top-level definition
/// name. Nodes are kept in bundle order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: IndexMap<SmolStr, IndexSet<SmolStr>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<SmolStr>) {
        self.edges.entry(name.into()).or_default();
    }

    /// Record that `from` depends on `to`. Both become nodes.
    pub fn add_edge(&mut self, from: impl Into<SmolStr>, to: impl Into<SmolStr>) {
        let to = to.into();
        self.add_node(to.clone());
        self.edges.entry(from.into()).or_default().insert(to);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges.get(from).is_some_and(|deps| deps.contains(to))
    }

    /// Nodes in bundle order.
    pub fn nodes(&self) -> impl Iterator<Item = &SmolStr> {
        self.edges.keys()
    }

    pub fn dependencies(&self, name: &str) -> impl Iterator<Item = &SmolStr> {
        self.edges.get(name).into_iter().flatten()
    }

    pub fn edges(&self) -> impl Iterator<Item = (&SmolStr, &SmolStr)> {
        self.edges
            .iter()
            .flat_map(|(from, deps)| deps.iter().map(move |to| (from, to)))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(IndexSet::len).sum()
    }

    /// Every node reachable from `roots`, roots included. Roots that are not
    /// nodes are ignored.
    pub fn reachable_from<'n>(
        &self,
        roots: impl IntoIterator<Item = &'n str>,
    ) -> FxHashSet<SmolStr> {
        let mut visited = FxHashSet::default();
        let mut queue: VecDeque<&SmolStr> = roots
            .into_iter()
            .filter_map(|root| self.edges.get_key_value(root).map(|(k, _)| k))
            .collect();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            for dep in self.dependencies(current) {
                if !visited.contains(dep) {
                    queue.push_back(dep);
                }
            }
        }
        visited
    }

    /// Build the graph of a parsed bundle.
    ///
    /// Text after a definition, up to the next one, belongs to that
    /// definition: statements patching a class right after it count as its
    /// references.
    pub fn from_tree(tree: &SourceTree<'_>) -> Self {
        let definitions = tree.definitions();
        let mut graph = Self::new();
        for def in &definitions {
            graph.add_node(def.name.clone());
        }

        let starts: Vec<TextSize> = definitions.iter().map(|d| d.range.start()).collect();
        let owner = |offset: TextSize| -> Option<usize> {
            match starts.partition_point(|start| *start <= offset) {
                0 => None,
                n => Some(n - 1),
            }
        };

        for def in &definitions {
            for base in &def.bases {
                if *base != def.name && graph.contains(base) {
                    graph.add_edge(def.name.clone(), base.clone());
                }
            }
        }

        for reference in references(tree) {
            let Some(i) = owner(reference.range.start()) else {
                continue;
            };
            let from = &definitions[i].name;
            if reference.name != *from && graph.contains(&reference.name) {
                graph.add_edge(from.clone(), reference.name);
            }
        }
        graph
    }
}

/// Build the final graph of `bundle_text`.
///
/// Returns `None` when the text does not parse cleanly; callers then skip
/// anything that needs the graph.
pub fn build_final_graph(bundle_text: &str) -> Option<DependencyGraph> {
    let mut parser = PythonParser::new().ok()?;
    let tree = match parser.parse(bundle_text, "bundle") {
        Ok(tree) => tree,
        Err(err) => {
            debug!(error = %err, "bundle text does not parse, no final graph");
            return None;
        }
    };
    let graph = DependencyGraph::from_tree(&tree);
    debug!(nodes = graph.len(), edges = graph.edge_count(), "final graph built");
    Some(graph)
}
