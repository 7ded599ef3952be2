//! Python syntax layer.
//!
//! Thin wrappers over tree-sitter that turn Python text into the facts the
//! bundler consumes. Nothing here knows about indexes or bundles.

mod layout;
mod python;
mod scan;

pub use layout::{BundleLayout, ITEM_SEPARATOR, LayoutItem};
pub use python::{
    DefinitionKind, ImportKind, ImportStatement, PythonParser, SourceTree, TopLevelDefinition,
};
pub use scan::{Reference, instantiations, referenced_names, references};
