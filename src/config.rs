//! Bundler configuration.
//!
//! Every tunable the engine consults lives here: where the corpus is, which
//! names may collide, which identifiers are never dependencies. Defaults
//! match a ComfyUI installation rooted at the current directory.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use smol_str::SmolStr;

/// First line written into generated bundles. The indexer skips any file
/// starting with it so generated code never feeds back into the corpus.
pub const DEFAULT_GENERATED_MARKER: &str = "# Generated by Subgraph Compiler";

const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git", ".hg", ".svn", "__pycache__", ".venv", "venv", "env", ".env", ".tox",
    "node_modules", "site-packages",
];

const DEFAULT_IGNORED_NAMES: &[&str] = &[
    "self", "cls", "args", "kwargs", "model", "clip", "vae", "image", "images", "mask",
    "latent", "samples", "conditioning", "positive", "negative", "seed", "steps", "cfg",
    "width", "height", "batch_size", "device", "dtype", "x", "y", "i", "j", "k", "s", "t",
    "out", "output", "result", "value", "key", "data", "config", "options", "name", "path",
];

const DEFAULT_BUILTINS: &[&str] = &[
    "abs", "all", "any", "bool", "bytes", "callable", "chr", "classmethod", "dict", "dir",
    "divmod", "enumerate", "filter", "float", "format", "frozenset", "getattr", "globals",
    "hasattr", "hash", "id", "int", "isinstance", "issubclass", "iter", "len", "list",
    "locals", "map", "max", "min", "next", "object", "open", "ord", "pow", "print",
    "property", "range", "repr", "reversed", "round", "set", "setattr", "slice", "sorted",
    "staticmethod", "str", "sum", "super", "tuple", "type", "vars", "zip", "None", "True",
    "False", "NotImplemented", "Ellipsis", "__name__", "__file__", "Exception",
    "BaseException", "ValueError", "TypeError", "KeyError", "IndexError", "RuntimeError",
    "AttributeError", "NotImplementedError", "StopIteration", "AssertionError",
    "ImportError", "OSError", "FileNotFoundError",
];

const DEFAULT_BASE_IMPORTS: &[&str] = &[
    "import torch",
    "import folder_paths",
    "import comfy.sd",
    "from comfy import utils",
    "from enum import StrEnum",
];

#[derive(Clone, Debug)]
pub struct BundlerConfig {
    /// Root that module paths and disambiguation tags are relative to.
    pub base_root: PathBuf,
    /// Directories scanned by the indexer. Each must live under `base_root`.
    pub source_roots: Vec<PathBuf>,
    /// Directory names never descended into.
    pub excluded_dirs: FxHashSet<SmolStr>,
    pub generated_marker: String,
    /// Names allowed to keep several definitions in the index.
    pub known_collisions: FxHashSet<SmolStr>,
    /// Tag of the variant that keeps its name when a collision is resolved.
    pub primary_tag: SmolStr,
    /// Common parameter and local names never treated as dependencies.
    pub ignored_names: FxHashSet<SmolStr>,
    /// Language built-ins; seeded as already processed.
    pub builtins: FxHashSet<SmolStr>,
    /// Root modules whose imports are always dropped from bundles.
    pub always_ignored_imports: FxHashSet<SmolStr>,
    /// Imports every bundle starts from (still subject to import pruning).
    pub base_imports: Vec<String>,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            base_root: PathBuf::from("."),
            source_roots: vec![PathBuf::from(".")],
            excluded_dirs: to_set(DEFAULT_EXCLUDED_DIRS),
            generated_marker: DEFAULT_GENERATED_MARKER.to_string(),
            known_collisions: FxHashSet::default(),
            primary_tag: SmolStr::new("comfy"),
            ignored_names: to_set(DEFAULT_IGNORED_NAMES),
            builtins: to_set(DEFAULT_BUILTINS),
            always_ignored_imports: FxHashSet::default(),
            base_imports: DEFAULT_BASE_IMPORTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl BundlerConfig {
    /// Configuration for a corpus rooted at `base_root`, scanned in full.
    pub fn for_root(base_root: impl Into<PathBuf>) -> Self {
        let base_root = base_root.into();
        Self {
            source_roots: vec![base_root.clone()],
            base_root,
            ..Self::default()
        }
    }

    pub fn with_source_roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.source_roots = roots.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
        self
    }

    pub fn with_known_collisions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.known_collisions.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_primary_tag(mut self, tag: impl Into<SmolStr>) -> Self {
        self.primary_tag = tag.into();
        self
    }

    pub fn with_ignored_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.ignored_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_always_ignored_imports<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.always_ignored_imports.extend(modules.into_iter().map(Into::into));
        self
    }

    pub fn with_base_imports<I, S>(mut self, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_imports = imports.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_generated_marker(mut self, marker: impl Into<String>) -> Self {
        self.generated_marker = marker.into();
        self
    }

    /// Whether an identifier can never be a dependency.
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored_names.contains(name) || self.builtins.contains(name)
    }

    pub fn is_excluded_dir(&self, dir_name: &str) -> bool {
        self.excluded_dirs.contains(dir_name)
    }
}

fn to_set(items: &[&str]) -> FxHashSet<SmolStr> {
    items.iter().map(|s| SmolStr::new(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BundlerConfig::default();

        assert!(config.is_ignored("self"));
        assert!(config.is_ignored("isinstance"));
        assert!(!config.is_ignored("VAELoader"));
        assert!(config.is_excluded_dir(".git"));
        assert!(config.generated_marker.starts_with('#'));
    }

    #[test]
    fn test_builders() {
        let config = BundlerConfig::for_root("/corpus")
            .with_known_collisions(["Util"])
            .with_primary_tag("core")
            .with_ignored_names(["ctx"])
            .with_base_imports(Vec::<String>::new());

        assert_eq!(config.base_root, Path::new("/corpus"));
        assert_eq!(config.source_roots, vec![PathBuf::from("/corpus")]);
        assert!(config.known_collisions.contains("Util"));
        assert_eq!(config.primary_tag, "core");
        assert!(config.is_ignored("ctx"));
        assert!(config.base_imports.is_empty());
    }
}
