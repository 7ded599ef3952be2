//! Per-request cache of corpus files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::base::FileId;
use crate::error::{BundleError, Result};

/// Files read while resolving one request.
///
/// Several definitions usually come from the same module; each file is read
/// from disk once and handed out as shared text afterwards. Dropped with the
/// request, so edits to the corpus show up on the next one.
#[derive(Debug, Default)]
pub struct FileSet {
    /// Path → FileId mapping
    path_to_id: IndexMap<PathBuf, FileId>,
    /// FileId → (Path, Contents), in load order
    files: IndexMap<FileId, (PathBuf, Arc<str>)>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `path` on first use; later calls return the cached text.
    pub fn load(&mut self, path: &Path) -> Result<(FileId, Arc<str>)> {
        if let Some(&id) = self.path_to_id.get(path) {
            if let Some((_, contents)) = self.files.get(&id) {
                return Ok((id, contents.clone()));
            }
        }

        let text = std::fs::read_to_string(path).map_err(|e| BundleError::io(path, e))?;
        let contents: Arc<str> = Arc::from(text);

        let id = FileId::new(self.files.len() as u32);
        self.path_to_id.insert(path.to_owned(), id);
        self.files.insert(id, (path.to_owned(), contents.clone()));
        Ok((id, contents))
    }

    pub fn path(&self, file: FileId) -> Option<&Path> {
        self.files.get(&file).map(|(path, _)| path.as_path())
    }

    pub fn contents(&self, file: FileId) -> Option<Arc<str>> {
        self.files.get(&file).map(|(_, contents)| contents.clone())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_set_reads_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.py");
        std::fs::write(&path, "class A:\n    pass\n").unwrap();

        let mut files = FileSet::new();
        let (id1, first) = files.load(&path).unwrap();

        std::fs::write(&path, "class Changed:\n    pass\n").unwrap();
        let (id2, second) = files.load(&path).unwrap();

        assert_eq!(id1, id2);
        assert_eq!(first, second);
        assert_eq!(files.len(), 1);
        assert_eq!(files.path(id1), Some(path.as_path()));
    }

    #[test]
    fn test_file_set_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = FileSet::new();

        let err = files.load(&dir.path().join("absent.py")).unwrap_err();
        assert!(matches!(err, BundleError::Io { .. }));
        assert!(files.is_empty());
    }
}
