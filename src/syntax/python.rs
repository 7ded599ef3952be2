//! Python syntax trees backed by tree-sitter.
//!
//! Only the handful of facts the bundler needs are exposed: top-level
//! definitions, top-level imports and the raw tree for the scanners in
//! [`super::scan`]. Everything returned is owned so callers never hold on to
//! tree-sitter lifetimes.

use smol_str::SmolStr;
use tree_sitter::{Node, Parser, Tree};

use crate::base::{LineCol, TextRange, byte_range};
use crate::error::{BundleError, Result};

/// Kind of a top-level definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    Class,
    Function,
}

impl DefinitionKind {
    fn from_node_kind(kind: &str) -> Option<Self> {
        match kind {
            "class_definition" => Some(Self::Class),
            "function_definition" => Some(Self::Function),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Function => "def",
        }
    }
}

/// A class or function defined directly at module level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopLevelDefinition {
    pub name: SmolStr,
    pub kind: DefinitionKind,
    /// Byte range of the definition, decorators included.
    pub range: TextRange,
    pub start: LineCol,
    /// Base classes named by a plain identifier.
    pub bases: Vec<SmolStr>,
}

/// How an import statement binds names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImportKind {
    /// `import a.b` / `import a as b`
    Module,
    /// `from m import x`
    From,
    /// `from m import *`
    Star,
    /// `from __future__ import x`
    Future,
}

/// A top-level import statement and the names it introduces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportStatement {
    /// Exact source text of the statement.
    pub text: String,
    pub kind: ImportKind,
    /// Root package of every imported module (`a` for `import a.b`).
    pub roots: Vec<SmolStr>,
    /// Names bound in the importing scope.
    pub bindings: Vec<SmolStr>,
    /// `from .x import y`; cannot survive bundling.
    pub is_relative: bool,
}

/// A reusable Python parser.
pub struct PythonParser {
    parser: Parser,
}

impl PythonParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_python::LANGUAGE.into())?;
        Ok(Self { parser })
    }

    /// Parse `source`, failing if tree-sitter had to recover from any error.
    ///
    /// `origin` only names the text in the error (a path, a symbol).
    pub fn parse<'s>(&mut self, source: &'s str, origin: &str) -> Result<SourceTree<'s>> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| BundleError::parse_failure(origin))?;
        if tree.root_node().has_error() {
            return Err(BundleError::parse_failure(origin));
        }
        Ok(SourceTree { source, tree })
    }
}

/// A successfully parsed Python module.
pub struct SourceTree<'s> {
    source: &'s str,
    tree: Tree,
}

impl<'s> SourceTree<'s> {
    pub fn source(&self) -> &'s str {
        self.source
    }

    pub(crate) fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Source text covered by `range`.
    pub fn slice(&self, range: TextRange) -> &'s str {
        let source: &'s str = self.source;
        &source[range]
    }

    pub(crate) fn node_text(&self, node: Node<'_>) -> &'s str {
        let source: &'s str = self.source;
        &source[node.byte_range()]
    }

    /// All top-level class and function definitions, in source order.
    pub fn definitions(&self) -> Vec<TopLevelDefinition> {
        let root = self.root();
        let mut cursor = root.walk();
        root.named_children(&mut cursor)
            .filter_map(|node| self.top_level_definition(node))
            .collect()
    }

    /// The top-level definition named `name`, if any. The first one wins.
    pub fn definition(&self, name: &str) -> Option<TopLevelDefinition> {
        self.definitions().into_iter().find(|def| def.name == name)
    }

    fn top_level_definition(&self, node: Node<'_>) -> Option<TopLevelDefinition> {
        let (outer, def) = match node.kind() {
            "decorated_definition" => (node, node.child_by_field_name("definition")?),
            _ => (node, node),
        };
        let kind = DefinitionKind::from_node_kind(def.kind())?;
        let name = self.node_text(def.child_by_field_name("name")?);

        let mut bases = Vec::new();
        if let Some(args) = def.child_by_field_name("superclasses") {
            let mut cursor = args.walk();
            for arg in args.named_children(&mut cursor) {
                if arg.kind() == "identifier" {
                    bases.push(SmolStr::new(self.node_text(arg)));
                }
            }
        }

        Some(TopLevelDefinition {
            name: SmolStr::new(name),
            kind,
            range: byte_range(outer.start_byte(), outer.end_byte()),
            start: outer.start_position().into(),
            bases,
        })
    }

    /// All import statements directly at module level, in source order.
    pub fn imports(&self) -> Vec<ImportStatement> {
        let root = self.root();
        let mut cursor = root.walk();
        root.named_children(&mut cursor)
            .filter_map(|node| self.import_statement(node))
            .collect()
    }

    fn import_statement(&self, node: Node<'_>) -> Option<ImportStatement> {
        let mut roots = Vec::new();
        let mut bindings = Vec::new();
        let mut is_relative = false;

        let kind = match node.kind() {
            "import_statement" => {
                for name in self.field_nodes(node, "name") {
                    let (module, alias) = self.split_alias(name);
                    let root = first_segment(self.node_text(module));
                    roots.push(root.clone());
                    bindings.push(alias.unwrap_or(root));
                }
                ImportKind::Module
            }
            "import_from_statement" => {
                let module = node.child_by_field_name("module_name")?;
                if module.kind() == "relative_import" {
                    is_relative = true;
                } else {
                    roots.push(first_segment(self.node_text(module)));
                }
                let mut cursor = node.walk();
                let star = node
                    .named_children(&mut cursor)
                    .any(|child| child.kind() == "wildcard_import");
                for name in self.field_nodes(node, "name") {
                    let (imported, alias) = self.split_alias(name);
                    bindings.push(alias.unwrap_or_else(|| SmolStr::new(self.node_text(imported))));
                }
                if star { ImportKind::Star } else { ImportKind::From }
            }
            "future_import_statement" => {
                roots.push(SmolStr::new("__future__"));
                ImportKind::Future
            }
            _ => return None,
        };

        Some(ImportStatement {
            text: self.node_text(node).to_string(),
            kind,
            roots,
            bindings,
            is_relative,
        })
    }

    fn field_nodes<'t>(&self, node: Node<'t>, field: &str) -> Vec<Node<'t>> {
        let mut cursor = node.walk();
        node.children_by_field_name(field, &mut cursor).collect()
    }

    /// Split `x as y` into (`x`, Some(`y`)); plain names come back unaliased.
    fn split_alias<'t>(&self, node: Node<'t>) -> (Node<'t>, Option<SmolStr>) {
        if node.kind() == "aliased_import" {
            if let (Some(name), Some(alias)) = (
                node.child_by_field_name("name"),
                node.child_by_field_name("alias"),
            ) {
                return (name, Some(SmolStr::new(self.node_text(alias))));
            }
        }
        (node, None)
    }
}

fn first_segment(dotted: &str) -> SmolStr {
    SmolStr::new(dotted.split('.').next().unwrap_or(dotted).trim())
}
