//! Symbol resolution: the transitive closure of definitions needed by a
//! set of entry names.
//!
//! Resolution is a worklist over names. Each name is looked up in the
//! [`CorpusIndex`], its defining file is re-parsed, and the definition text
//! is copied out and scanned for identifiers that are themselves corpus
//! definitions. Those are pushed back onto the worklist.
//!
//! The dependency test is lexical. There is no scope analysis, so local
//! variables that happen to share a name with a corpus definition are
//! treated as dependencies unless they are listed in
//! [`BundlerConfig::ignored_names`].
//!
//! ## Key Data Structures
//!
//! - [`DiscoveryGraph`] - edges observed while resolving, in discovery order
//! - [`DefinitionRecord`] - one collected definition and where it came from
//! - [`Resolution`] - everything a request collected

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use tracing::{debug, warn};

use super::diagnostics::DiagnosticCollector;
use super::index::{CorpusIndex, SymbolIndexEntry, Variant};
use super::rename::{RenameMap, rename_definition_header, rewrite_ranges};
use crate::base::{ModulePath, TextRange};
use crate::config::BundlerConfig;
use crate::error::{BundleError, Result};
use crate::project::FileSet;
use crate::syntax::{DefinitionKind, ITEM_SEPARATOR, PythonParser, references};

// ============================================================================
// DISCOVERY GRAPH
// ============================================================================

/// Dependencies observed while resolving, keyed by final name.
///
/// Only used for diagnostics and tests. Ordering and pruning are driven by
/// the final graph rebuilt from the bundle text, since textual patches can
/// change what references what.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiscoveryGraph {
    edges: IndexMap<SmolStr, IndexSet<SmolStr>>,
}

impl DiscoveryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str) {
        self.edges.entry(SmolStr::new(name)).or_default();
    }

    /// Record that `from` depends on `to`.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.edges
            .entry(SmolStr::new(from))
            .or_default()
            .insert(SmolStr::new(to));
    }

    pub fn dependencies(&self, name: &str) -> Option<&IndexSet<SmolStr>> {
        self.edges.get(name)
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges.get(from).is_some_and(|deps| deps.contains(to))
    }

    /// Nodes in the order they were first seen.
    pub fn nodes(&self) -> impl Iterator<Item = &SmolStr> {
        self.edges.keys()
    }

    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(IndexSet::len).sum()
    }
}

// ============================================================================
// RESOLUTION RESULT
// ============================================================================

/// One collected definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefinitionRecord {
    /// Name as written in the corpus.
    pub name: SmolStr,
    /// Name in the bundle; differs from `name` for renamed variants.
    pub resolved_name: SmolStr,
    /// Definition text after header renaming and call-site rewrites.
    pub source_text: String,
    pub source_module_path: ModulePath,
    pub kind: DefinitionKind,
}

/// Everything collected for one set of entry names.
#[derive(Clone, Debug, Default)]
pub struct Resolution {
    /// Absolute top-level import statements of every contributing file.
    pub imports: BTreeSet<String>,
    /// Collected definitions by resolved name, in collection order.
    pub definitions: IndexMap<SmolStr, DefinitionRecord>,
    pub discovery_graph: DiscoveryGraph,
    pub renames: RenameMap,
    pub diagnostics: DiagnosticCollector,
}

impl Resolution {
    /// The collected definitions joined with blank lines, in collection order.
    pub fn bundle_text(&self) -> String {
        self.definitions
            .values()
            .map(|record| record.source_text.as_str())
            .collect::<Vec<_>>()
            .join(ITEM_SEPARATOR)
    }

    pub fn contains(&self, resolved_name: &str) -> bool {
        self.definitions.contains_key(resolved_name)
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

/// Worklist bookkeeping for one request.
#[derive(Debug, Default)]
struct WorklistState {
    /// Names fully handled (collected, abandoned or ignored).
    processed: FxHashSet<SmolStr>,
    /// Names ever pushed; a name is pushed at most once.
    queued: FxHashSet<SmolStr>,
    /// Pending names, popped last-in first-out.
    stack: Vec<SmolStr>,
}

/// A dependency found in a definition body.
struct Dependency {
    /// Name to push on the worklist.
    name: SmolStr,
    /// Name the edge points at (a variant's final name after rewrites).
    target: SmolStr,
}

/// Resolves entry names to the definitions they transitively need.
///
/// A resolver serves one request: it owns the per-request file cache and
/// worklist, and is consumed by [`Resolver::resolve`].
pub struct Resolver<'a> {
    index: &'a CorpusIndex,
    config: &'a BundlerConfig,
    parser: PythonParser,
    files: FileSet,
    state: WorklistState,
    resolution: Resolution,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over `index`. Fails only if the grammar cannot load.
    pub fn new(index: &'a CorpusIndex, config: &'a BundlerConfig) -> Result<Self> {
        let state = WorklistState {
            processed: config.builtins.iter().cloned().collect(),
            ..WorklistState::default()
        };
        Ok(Self {
            index,
            config,
            parser: PythonParser::new()?,
            files: FileSet::new(),
            state,
            resolution: Resolution::default(),
        })
    }

    /// Collect everything `entry_names` needs.
    ///
    /// Never fails: a name that cannot be resolved is logged, recorded as a
    /// diagnostic and left out of the bundle.
    pub fn resolve<I, S>(mut self, entry_names: I) -> Resolution
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        // Sorted so the same entry set always resolves the same way.
        let entries: BTreeSet<SmolStr> = entry_names.into_iter().map(Into::into).collect();
        for name in entries.into_iter().rev() {
            self.push(name);
        }

        while let Some(name) = self.state.stack.pop() {
            if let Err(err) = self.process(&name) {
                self.report(&err, &name);
                self.state.processed.insert(name);
            }
        }

        debug!(
            definitions = self.resolution.definitions.len(),
            imports = self.resolution.imports.len(),
            files = self.files.len(),
            "resolution finished"
        );
        self.resolution
    }

    fn push(&mut self, name: SmolStr) {
        if self.state.processed.contains(&name) {
            return;
        }
        if self.state.queued.insert(name.clone()) {
            self.state.stack.push(name);
        }
    }

    fn report(&mut self, err: &BundleError, name: &str) {
        match err {
            BundleError::UnresolvableSource { .. } => {
                debug!(name = %name, error = %err, "treating symbol as external")
            }
            _ => warn!(name = %name, error = %err, "could not resolve symbol"),
        }
        self.resolution.diagnostics.record(err, Some(name));
    }

    fn process(&mut self, name: &SmolStr) -> Result<()> {
        if self.state.processed.contains(name) || self.config.is_ignored(name) {
            return Ok(());
        }
        let index = self.index;
        let Some(entry) = index.lookup(name) else {
            return Err(BundleError::NotFound { name: name.clone() });
        };
        if self.is_shadowed(name, entry) {
            self.state.processed.insert(name.clone());
            return Ok(());
        }
        self.state.processed.insert(name.clone());

        for variant in entry.variants(name, &self.config.primary_tag) {
            if let Err(err) = self.collect_variant(name, &variant) {
                self.report(&err, &variant.final_name);
            }
        }
        Ok(())
    }

    /// Whether a renamed variant of `name` was already handled.
    fn is_shadowed(&self, name: &str, entry: &SymbolIndexEntry) -> bool {
        entry
            .variants(name, &self.config.primary_tag)
            .iter()
            .any(|v| v.is_renamed(name) && self.state.processed.contains(&v.final_name))
    }

    fn collect_variant(&mut self, name: &SmolStr, variant: &Variant) -> Result<()> {
        self.state.processed.insert(variant.final_name.clone());
        if self.resolution.definitions.contains_key(&variant.final_name) {
            return Ok(());
        }

        let path = locate_source(&variant.module_path, &self.config.base_root)?;
        let (_, source) = self.files.load(&path)?;
        let tree = self.parser.parse(&source, &path.to_string_lossy())?;

        let Some(definition) = tree.definition(name) else {
            return Err(BundleError::MissingDefinition {
                name: name.clone(),
                path,
            });
        };
        let module_definitions: FxHashSet<SmolStr> =
            tree.definitions().into_iter().map(|d| d.name).collect();
        let imports: Vec<String> = tree
            .imports()
            .into_iter()
            .filter(|import| !import.is_relative)
            .map(|import| import.text)
            .collect();

        let mut text = tree.slice(definition.range).trim_end().to_string();
        if variant.is_renamed(name) {
            text = rename_definition_header(&text, definition.kind, name, &variant.final_name)
                .ok_or_else(|| BundleError::MissingDefinition {
                    name: name.clone(),
                    path: path.clone(),
                })?;
            if let Some(tag) = &variant.tag {
                self.resolution.renames.record(name, tag, &variant.final_name);
            }
            debug!(name = %name, renamed = %variant.final_name, "renamed colliding definition");
        }

        self.resolution.imports.extend(imports);

        let (text, dependencies) =
            self.scan_dependencies(name, variant, text, &module_definitions)?;

        let graph = &mut self.resolution.discovery_graph;
        graph.add_node(&variant.final_name);
        for dep in &dependencies {
            graph.add_edge(&variant.final_name, &dep.target);
        }

        self.resolution.definitions.insert(
            variant.final_name.clone(),
            DefinitionRecord {
                name: name.clone(),
                resolved_name: variant.final_name.clone(),
                source_text: text,
                source_module_path: variant.module_path.clone(),
                kind: definition.kind,
            },
        );

        for dep in dependencies {
            self.push(dep.name);
        }
        Ok(())
    }

    /// Find the dependencies of one definition, rewriting references to
    /// same-module collision variants on the way.
    fn scan_dependencies(
        &mut self,
        name: &str,
        variant: &Variant,
        text: String,
        module_definitions: &FxHashSet<SmolStr>,
    ) -> Result<(String, Vec<Dependency>)> {
        let tree = self.parser.parse(&text, &variant.final_name)?;
        let primary = &self.config.primary_tag;

        let mut rewrites: Vec<(TextRange, SmolStr)> = Vec::new();
        let mut found: IndexMap<SmolStr, SmolStr> = IndexMap::new();

        for reference in references(&tree) {
            let ident = reference.name;
            if self.config.is_ignored(&ident) {
                continue;
            }

            let target = match self.index.lookup(&ident) {
                Some(entry) => match entry.variant_in(&ident, primary, &variant.module_path) {
                    Some(local) if local.is_renamed(&ident) => {
                        rewrites.push((reference.range, local.final_name.clone()));
                        if let Some(tag) = &local.tag {
                            self.resolution.renames.record(&ident, tag, &local.final_name);
                        }
                        local.final_name
                    }
                    _ => ident.clone(),
                },
                None if module_definitions.contains(&ident) => ident.clone(),
                None => continue,
            };

            if ident == name || target == variant.final_name {
                continue;
            }
            found.entry(target).or_insert(ident);
        }
        drop(tree);

        let text = if rewrites.is_empty() {
            text
        } else {
            debug!(
                name = %variant.final_name,
                count = rewrites.len(),
                "rewrote references to same-module variants"
            );
            rewrite_ranges(&text, &rewrites)
        };

        let dependencies = found
            .into_iter()
            .map(|(target, name)| Dependency { name, target })
            .collect();
        Ok((text, dependencies))
    }
}

/// The source file holding `module`, preferring `a/b.py` over
/// `a/b/__init__.py`.
///
/// A module with no source file is [`BundleError::UnresolvableSource`],
/// whether it is a compiled extension or simply gone.
pub fn locate_source(module: &ModulePath, base_root: &Path) -> Result<PathBuf> {
    if let Some(path) = module
        .source_candidates(base_root)
        .into_iter()
        .find(|candidate| candidate.is_file())
    {
        return Ok(path);
    }

    let reason = if module.find_native(base_root).is_some() {
        "compiled extension"
    } else {
        "no source file"
    };
    Err(BundleError::UnresolvableSource {
        module: module.clone(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::diagnostics::codes;
    use crate::hir::index::CorpusIndexer;
    use std::fs;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn resolve(config: &BundlerConfig, entries: &[&str]) -> Resolution {
        let index = CorpusIndexer::new(config).build();
        Resolver::new(&index, config)
            .unwrap()
            .resolve(entries.iter().copied())
    }

    #[test]
    fn test_transitive_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "nodes.py",
            "import torch\nfrom .local import thing\n\nclass A:\n    def run(self):\n        return B().go()\n\nclass B:\n    def go(self):\n        return torch.ones(1)\n",
        );

        let config = BundlerConfig::for_root(dir.path());
        let resolution = resolve(&config, &["A"]);

        let names: Vec<_> = resolution.definitions.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert!(resolution.discovery_graph.has_edge("A", "B"));
        assert_eq!(
            resolution.imports.iter().collect::<Vec<_>>(),
            vec!["import torch"]
        );
        assert!(resolution.diagnostics.diagnostics().is_empty());
    }

    #[test]
    fn test_unknown_entry_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "nodes.py", "class A:\n    pass\n");

        let config = BundlerConfig::for_root(dir.path());
        let resolution = resolve(&config, &["A", "Ghost"]);

        assert!(resolution.contains("A"));
        assert!(!resolution.contains("Ghost"));
        assert_eq!(resolution.diagnostics.with_code(codes::NOT_FOUND).len(), 1);
    }

    #[test]
    fn test_ignored_names_are_not_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "nodes.py",
            "class model:\n    pass\n\ndef run(model):\n    return len(model)\n",
        );

        let config = BundlerConfig::for_root(dir.path());
        let resolution = resolve(&config, &["run"]);

        assert_eq!(resolution.definitions.len(), 1);
        assert!(!resolution.contains("model"));
    }

    #[test]
    fn test_collision_variants_and_call_site_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "core/util.py", "class Util:\n    kind = 'core'\n");
        write(
            dir.path(),
            "experimental/util.py",
            "class Util:\n    kind = 'experimental'\n\nclass Fancy:\n    def make(self):\n        return Util()\n",
        );

        let config = BundlerConfig::for_root(dir.path())
            .with_known_collisions(["Util"])
            .with_primary_tag("core");
        let resolution = resolve(&config, &["Fancy", "Util"]);

        let core = &resolution.definitions["Util"];
        assert_eq!(core.source_module_path, ModulePath::new("core.util"));
        let experimental = &resolution.definitions["Util_experimental"];
        assert!(experimental.source_text.starts_with("class Util_experimental:"));

        let fancy = &resolution.definitions["Fancy"];
        assert!(fancy.source_text.contains("return Util_experimental()"));
        assert!(resolution.discovery_graph.has_edge("Fancy", "Util_experimental"));
        assert!(resolution.renames.contains_resolved("Util_experimental"));
    }

    #[test]
    fn test_missing_module_file_is_unresolvable() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "pkg/gone.py", "class Gone:\n    pass\n");

        let config = BundlerConfig::for_root(dir.path());
        let index = CorpusIndexer::new(&config).build();
        fs::remove_file(dir.path().join("pkg/gone.py")).unwrap();

        let resolution = Resolver::new(&index, &config).unwrap().resolve(["Gone"]);

        assert!(resolution.definitions.is_empty());
        assert_eq!(
            resolution.diagnostics.with_code(codes::UNRESOLVABLE_SOURCE).len(),
            1
        );
    }

    #[test]
    fn test_bundle_text_joins_definitions() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "nodes.py",
            "def helper():\n    return 1\n\ndef main():\n    return helper()\n",
        );

        let config = BundlerConfig::for_root(dir.path());
        let resolution = resolve(&config, &["main"]);

        assert_eq!(
            resolution.bundle_text(),
            "def main():\n    return helper()\n\ndef helper():\n    return 1"
        );
    }
}
