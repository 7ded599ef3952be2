//! Foundation types shared by every layer of the compiler.
//!
//! - [`FileId`] - handle for a corpus file cached during a request
//! - [`ModulePath`], [`DisambiguationTag`] - where a definition lives
//! - [`TextRange`], [`TextSize`], [`LineCol`] - source positions
//!
//! This module has NO dependencies on other crate modules.

mod file_id;
mod module_path;
mod span;

pub use file_id::FileId;
pub use module_path::{DisambiguationTag, ModulePath, NATIVE_EXTENSIONS, SOURCE_EXTENSION};
pub use span::{LineCol, TextRange, TextSize};
pub(crate) use span::byte_range;

// Re-export text-size types for convenience
pub use text_size;
