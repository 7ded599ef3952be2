//! Corpus index: which module defines each top-level class and function.
//!
//! The index is built once per [`IndexCache`] by scanning every source root,
//! and is immutable afterwards. Requests share it through an `Arc`.
//!
//! # Collisions
//!
//! A name defined in several files keeps its first occurrence, except for the
//! names in [`BundlerConfig::known_collisions`]: those become a
//! [`SymbolIndexEntry::Multiple`] listing every location with a
//! [`DisambiguationTag`], so the resolver can bundle each variant under its
//! own name.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::{debug, info, warn};

use crate::base::{DisambiguationTag, ModulePath};
use crate::config::BundlerConfig;
use crate::error::BundleError;
use crate::project::CorpusLoader;
use crate::syntax::{DefinitionKind, PythonParser};

// ============================================================================
// INDEX ENTRIES
// ============================================================================

/// One place a colliding name is defined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub module_path: ModulePath,
    pub tag: DisambiguationTag,
}

/// Where a name is defined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SymbolIndexEntry {
    Single(ModulePath),
    /// Known collision, in corpus walk order.
    Multiple(Vec<Location>),
}

/// One concrete definition a name resolves to, with the name it is bundled
/// under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variant {
    pub module_path: ModulePath,
    pub tag: Option<DisambiguationTag>,
    pub final_name: SmolStr,
}

impl Variant {
    pub fn is_renamed(&self, name: &str) -> bool {
        self.final_name != name
    }
}

impl SymbolIndexEntry {
    pub fn is_collision(&self) -> bool {
        matches!(self, Self::Multiple(locations) if locations.len() > 1)
    }

    pub fn module_paths(&self) -> Vec<&ModulePath> {
        match self {
            Self::Single(module) => vec![module],
            Self::Multiple(locations) => locations.iter().map(|l| &l.module_path).collect(),
        }
    }

    /// Position of the canonical location: the first whose tag matches
    /// `primary`, or the first location when none does.
    pub fn canonical_position(&self, primary: &str) -> usize {
        match self {
            Self::Single(_) => 0,
            Self::Multiple(locations) => locations
                .iter()
                .position(|l| l.tag.is_primary(primary))
                .unwrap_or(0),
        }
    }

    /// Every definition `name` resolves to. Only non-canonical variants of a
    /// collision are renamed, to `{name}_{tag}`.
    pub fn variants(&self, name: &str, primary: &str) -> Vec<Variant> {
        match self {
            Self::Single(module) => vec![Variant {
                module_path: module.clone(),
                tag: None,
                final_name: SmolStr::new(name),
            }],
            Self::Multiple(locations) => {
                let canonical = self.canonical_position(primary);
                let should_rename = locations.len() > 1;
                locations
                    .iter()
                    .enumerate()
                    .map(|(i, location)| Variant {
                        module_path: location.module_path.clone(),
                        tag: Some(location.tag.clone()),
                        final_name: if should_rename && i != canonical {
                            SmolStr::new(format!("{}_{}", name, location.tag))
                        } else {
                            SmolStr::new(name)
                        },
                    })
                    .collect()
            }
        }
    }

    /// The variant of `name` defined in `module`, if it is one of the locations.
    pub fn variant_in(&self, name: &str, primary: &str, module: &ModulePath) -> Option<Variant> {
        self.variants(name, primary)
            .into_iter()
            .find(|v| &v.module_path == module)
    }
}

// ============================================================================
// CORPUS INDEX
// ============================================================================

/// Counters describing the last scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub files_indexed: usize,
    pub files_generated: usize,
    pub files_failed: usize,
}

/// Name → defining module, for classes and functions separately.
#[derive(Clone, Debug, Default)]
pub struct CorpusIndex {
    classes: FxHashMap<SmolStr, SymbolIndexEntry>,
    functions: FxHashMap<SmolStr, SymbolIndexEntry>,
    stats: IndexStats,
}

impl CorpusIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(&self, name: &str) -> Option<&SymbolIndexEntry> {
        self.classes.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&SymbolIndexEntry> {
        self.functions.get(name)
    }

    /// Look `name` up as a class first, then as a function.
    pub fn lookup(&self, name: &str) -> Option<&SymbolIndexEntry> {
        self.class(name).or_else(|| self.function(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name) || self.functions.contains_key(name)
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.functions.is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        self.stats
    }
}

// ============================================================================
// INDEXER
// ============================================================================

/// What scanning one file produced.
enum FileScan {
    Indexed {
        path: PathBuf,
        module_path: ModulePath,
        tag: DisambiguationTag,
        definitions: Vec<(SmolStr, DefinitionKind)>,
    },
    Generated(PathBuf),
    Failed(PathBuf, BundleError),
}

/// Builds a [`CorpusIndex`] from the configured source roots.
pub struct CorpusIndexer<'a> {
    config: &'a BundlerConfig,
    /// Tag of the first occurrence of every name, for late collision upgrades.
    first_tags: FxHashMap<(DefinitionKind, SmolStr), DisambiguationTag>,
}

impl<'a> CorpusIndexer<'a> {
    pub fn new(config: &'a BundlerConfig) -> Self {
        Self {
            config,
            first_tags: FxHashMap::default(),
        }
    }

    /// Scan the corpus and build the index.
    ///
    /// Files are parsed in parallel but merged in walk order, so "first
    /// occurrence" is the same on every run. Unreadable or unparsable files
    /// are logged and skipped.
    pub fn build(mut self) -> CorpusIndex {
        let loader = CorpusLoader::new(self.config);
        let files = loader.collect_source_files();

        let scans: Vec<FileScan> = files
            .par_iter()
            .map_init(|| None, |parser, path| self.scan_with(&loader, parser, path))
            .collect();

        let mut index = CorpusIndex::new();
        for scan in scans {
            match scan {
                FileScan::Indexed {
                    path,
                    module_path,
                    tag,
                    definitions,
                } => {
                    for (name, kind) in definitions {
                        self.insert(&mut index, kind, name, &module_path, &tag, &path);
                    }
                    index.stats.files_indexed += 1;
                }
                FileScan::Generated(path) => {
                    debug!(path = %path.display(), "skipping generated bundle");
                    index.stats.files_generated += 1;
                }
                FileScan::Failed(path, err) => {
                    warn!(path = %path.display(), error = %err, "skipping corpus file");
                    index.stats.files_failed += 1;
                }
            }
        }

        info!(
            files = index.stats.files_indexed,
            classes = index.class_count(),
            functions = index.function_count(),
            "corpus index built"
        );
        index
    }

    /// Scan `path` with this worker's parser, creating it on first use. If
    /// the grammar fails to load, the file records that `Language` error and
    /// the next file tries again.
    fn scan_with(
        &self,
        loader: &CorpusLoader<'_>,
        slot: &mut Option<PythonParser>,
        path: &Path,
    ) -> FileScan {
        let mut parser = match slot.take() {
            Some(parser) => parser,
            None => match PythonParser::new() {
                Ok(parser) => parser,
                Err(err) => return FileScan::Failed(path.to_path_buf(), err),
            },
        };
        let scan = self.scan_file(loader, &mut parser, path);
        *slot = Some(parser);
        scan
    }

    fn scan_file(
        &self,
        loader: &CorpusLoader<'_>,
        parser: &mut PythonParser,
        path: &Path,
    ) -> FileScan {
        let text = match loader.read(path) {
            Ok(text) => text,
            Err(err) => return FileScan::Failed(path.to_path_buf(), err),
        };
        if loader.is_generated(&text) {
            return FileScan::Generated(path.to_path_buf());
        }
        let Some(module_path) = ModulePath::from_file(&self.config.base_root, path) else {
            return FileScan::Failed(
                path.to_path_buf(),
                BundleError::parse_failure("module path outside the base root"),
            );
        };
        let tree = match parser.parse(&text, &path.to_string_lossy()) {
            Ok(tree) => tree,
            Err(err) => return FileScan::Failed(path.to_path_buf(), err),
        };

        FileScan::Indexed {
            path: path.to_path_buf(),
            tag: DisambiguationTag::from_file(&self.config.base_root, path),
            module_path,
            definitions: tree
                .definitions()
                .into_iter()
                .map(|def| (def.name, def.kind))
                .collect(),
        }
    }

    fn insert(
        &mut self,
        index: &mut CorpusIndex,
        kind: DefinitionKind,
        name: SmolStr,
        module_path: &ModulePath,
        tag: &DisambiguationTag,
        path: &Path,
    ) {
        let table = match kind {
            DefinitionKind::Class => &mut index.classes,
            DefinitionKind::Function => &mut index.functions,
        };

        let Some(existing) = table.get_mut(&name) else {
            table.insert(name.clone(), SymbolIndexEntry::Single(module_path.clone()));
            self.first_tags.insert((kind, name), tag.clone());
            return;
        };

        if existing.module_paths().contains(&module_path) {
            // Redefined within the same module; the first definition wins.
            return;
        }

        if !self.config.known_collisions.contains(&name) {
            match kind {
                DefinitionKind::Class => warn!(
                    name = %name,
                    path = %path.display(),
                    "duplicate class definition, keeping first occurrence"
                ),
                DefinitionKind::Function => debug!(
                    name = %name,
                    path = %path.display(),
                    "duplicate function definition, keeping first occurrence"
                ),
            }
            return;
        }

        if let SymbolIndexEntry::Single(first) = existing {
            let first_tag = self
                .first_tags
                .get(&(kind, name.clone()))
                .cloned()
                .unwrap_or_else(|| DisambiguationTag::new(DisambiguationTag::ROOT));
            *existing = SymbolIndexEntry::Multiple(vec![Location {
                module_path: first.clone(),
                tag: first_tag,
            }]);
        }

        if let SymbolIndexEntry::Multiple(locations) = existing {
            let mut tag = tag.clone();
            if locations.iter().any(|l| l.tag == tag) {
                tag = tag.qualified_with(module_path);
            }
            debug!(name = %name, tag = %tag, "recording known collision");
            locations.push(Location {
                module_path: module_path.clone(),
                tag,
            });
        }
    }
}

// ============================================================================
// PROCESS-SCOPED CACHE
// ============================================================================

/// Holds the corpus index for the lifetime of the process.
///
/// The first request builds it; every later request reuses it. Two requests
/// racing to build may both scan the corpus, but only the first result is
/// stored and both get the same index back.
#[derive(Debug, Default)]
pub struct IndexCache {
    index: RwLock<Option<Arc<CorpusIndex>>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_built(&self) -> bool {
        self.index.read().is_some()
    }

    pub fn get(&self) -> Option<Arc<CorpusIndex>> {
        self.index.read().clone()
    }

    /// Return the cached index, building it on first use.
    pub fn get_or_build(&self, config: &BundlerConfig) -> Arc<CorpusIndex> {
        // Fast path: read lock
        if let Some(index) = self.get() {
            return index;
        }

        // Build without holding the lock; scanning the corpus is slow.
        let built = Arc::new(CorpusIndexer::new(config).build());

        // Double-check after acquiring write lock
        let mut slot = self.index.write();
        slot.get_or_insert(built).clone()
    }

    /// Build the index unless it already exists. Returns whether this call
    /// stored a new index.
    pub fn build_index(&self, config: &BundlerConfig) -> bool {
        if self.is_built() {
            return false;
        }
        let built = Arc::new(CorpusIndexer::new(config).build());

        let mut slot = self.index.write();
        if slot.is_some() {
            return false;
        }
        *slot = Some(built);
        true
    }
}
