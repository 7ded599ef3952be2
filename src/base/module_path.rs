//! Dotted module paths and the location tags derived from them.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use smol_str::SmolStr;

/// Extension of the source files the corpus is made of.
pub const SOURCE_EXTENSION: &str = "py";

/// Extensions of compiled extension modules, which can never be inlined.
pub const NATIVE_EXTENSIONS: &[&str] = &["so", "pyd"];

const PACKAGE_INIT: &str = "__init__";

/// A dotted module path such as `comfy_extras.nodes_mask`.
#[derive(Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ModulePath(SmolStr);

impl ModulePath {
    pub fn new(path: impl Into<SmolStr>) -> Self {
        Self(path.into())
    }

    /// Derive the module path of `file` relative to `base_root`.
    ///
    /// `pkg/mod.py` becomes `pkg.mod` and `pkg/__init__.py` becomes `pkg`.
    /// Returns `None` for files outside the base root, files without the
    /// source extension, and path components that are not valid UTF-8.
    pub fn from_file(base_root: &Path, file: &Path) -> Option<Self> {
        if file.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION) {
            return None;
        }
        let relative = file.strip_prefix(base_root).ok()?.with_extension("");

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_str()?),
                _ => return None,
            }
        }
        if segments.last() == Some(&PACKAGE_INIT) {
            segments.pop();
        }
        if segments.is_empty() {
            return None;
        }
        Some(Self(SmolStr::new(segments.join("."))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// The last segment, e.g. `nodes_mask` for `comfy_extras.nodes_mask`.
    pub fn stem(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// Files that may hold this module, in lookup order: the module file,
    /// then the package initializer.
    pub fn source_candidates(&self, base_root: &Path) -> [PathBuf; 2] {
        let dir = self.segments().fold(base_root.to_path_buf(), |acc, s| acc.join(s));
        [
            dir.with_extension(SOURCE_EXTENSION),
            dir.join(PACKAGE_INIT).with_extension(SOURCE_EXTENSION),
        ]
    }

    /// A compiled extension providing this module, if one exists.
    ///
    /// Matches ABI-tagged names too (`mod.cpython-311-x86_64-linux-gnu.so`).
    pub fn find_native(&self, base_root: &Path) -> Option<PathBuf> {
        let file = self.segments().fold(base_root.to_path_buf(), |acc, s| acc.join(s));
        let dir = file.parent()?;
        let prefix = format!("{}.", self.stem());

        std::fs::read_dir(dir).ok()?.flatten().map(|e| e.path()).find(|path| {
            let is_native = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| NATIVE_EXTENSIONS.contains(&ext));
            let matches_stem = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix));
            is_native && matches_stem
        })
    }
}

impl fmt::Debug for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModulePath({})", self.0)
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A deterministic, identifier-safe string naming where a colliding
/// definition came from. Appended to the definition name when renaming.
#[derive(Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct DisambiguationTag(SmolStr);

impl DisambiguationTag {
    /// Tag used for files that sit directly in the base root.
    pub const ROOT: &'static str = "root";

    pub fn new(tag: impl Into<SmolStr>) -> Self {
        Self(tag.into())
    }

    /// Derive the tag of `file` from its directory relative to `base_root`.
    ///
    /// `custom_nodes/my-pack/nodes.py` yields `custom_nodes_my_pack`.
    pub fn from_file(base_root: &Path, file: &Path) -> Self {
        let dir = file
            .parent()
            .and_then(|p| p.strip_prefix(base_root).ok())
            .unwrap_or_else(|| Path::new(""));

        let mut tag = String::new();
        for component in dir.components() {
            if let Component::Normal(part) = component {
                if !tag.is_empty() {
                    tag.push('_');
                }
                tag.push_str(&sanitize_segment(&part.to_string_lossy()));
            }
        }
        if tag.is_empty() {
            return Self::new(Self::ROOT);
        }
        Self(SmolStr::new(tag))
    }

    /// Make this tag distinct from an existing one by appending the module stem.
    pub fn qualified_with(&self, module: &ModulePath) -> Self {
        Self(SmolStr::new(format!("{}_{}", self.0, sanitize_segment(module.stem()))))
    }

    /// Whether this tag designates the canonical variant for `primary`.
    ///
    /// Sub-directories of the primary location count as primary too.
    pub fn is_primary(&self, primary: &str) -> bool {
        self.0 == primary
            || self
                .0
                .strip_prefix(primary)
                .is_some_and(|rest| rest.starts_with('_'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DisambiguationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.0)
    }
}

impl fmt::Display for DisambiguationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if unicode_ident::is_xid_continue(c) { c } else { '_' })
        .collect()
}
