use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::base::SOURCE_EXTENSION;
use crate::config::BundlerConfig;
use crate::error::{BundleError, Result};

/// Discovers and reads the Python files of the corpus.
pub struct CorpusLoader<'a> {
    config: &'a BundlerConfig,
}

impl<'a> CorpusLoader<'a> {
    pub fn new(config: &'a BundlerConfig) -> Self {
        Self { config }
    }

    /// Every source file under the configured roots, in a stable order.
    ///
    /// Excluded directories are pruned from the walk. Roots that do not exist
    /// are logged and skipped; the same file reachable from two roots is
    /// listed once.
    pub fn collect_source_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for root in &self.config.source_roots {
            if !root.is_dir() {
                warn!(root = %root.display(), "source root is not a directory, skipping");
                continue;
            }
            let walker = WalkDir::new(root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| !self.is_excluded(entry));

            for entry in walker {
                match entry {
                    Ok(entry) if is_source_file(entry.path()) => {
                        files.push(entry.into_path());
                    }
                    Ok(_) => {}
                    Err(err) => debug!(error = %err, "skipping unreadable corpus entry"),
                }
            }
        }

        let mut seen = rustc_hash::FxHashSet::default();
        files.retain(|path| seen.insert(path.clone()));
        files
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.config.is_excluded_dir(name))
    }

    /// Read a corpus file as UTF-8 text.
    pub fn read(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| BundleError::io(path, e))
    }

    /// Whether `text` is a previously generated bundle.
    pub fn is_generated(&self, text: &str) -> bool {
        let marker = self.config.generated_marker.trim();
        !marker.is_empty()
            && text
                .lines()
                .next()
                .is_some_and(|first| first.trim_start_matches('\u{feff}').starts_with(marker))
    }
}

fn is_source_file(path: &Path) -> bool {
    path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXTENSION)
}
