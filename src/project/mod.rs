//! Corpus access: discovering source files and caching their contents.

mod corpus_loader;
mod file_set;

pub use corpus_loader::CorpusLoader;
pub use file_set::FileSet;
