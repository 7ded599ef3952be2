//! Lexical scanners over a parsed tree.
//!
//! [`references`] approximates "names read by this code": every identifier
//! except the ones in a binding or member position. There is no scope
//! analysis; callers filter the result against a denylist.
//!
//! [`instantiations`] is deliberately separate: it only reports call
//! expressions whose callee is a bare name, which is how generated wrapper
//! code instantiates node classes.

use indexmap::IndexSet;
use smol_str::SmolStr;
use tree_sitter::Node;

use super::python::SourceTree;
use crate::base::{TextRange, byte_range};

/// One identifier occurrence in load position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    pub name: SmolStr,
    pub range: TextRange,
}

/// Every identifier reference in `tree`, in source order.
pub fn references(tree: &SourceTree<'_>) -> Vec<Reference> {
    let mut refs = Vec::new();
    walk_preorder(tree.root(), |node| {
        if node.kind() == "identifier" && !is_binding_position(node) {
            refs.push(Reference {
                name: SmolStr::new(tree.node_text(node)),
                range: byte_range(node.start_byte(), node.end_byte()),
            });
        }
    });
    refs
}

/// Distinct referenced names in `tree`, in first-use order.
pub fn referenced_names(tree: &SourceTree<'_>) -> IndexSet<SmolStr> {
    references(tree).into_iter().map(|r| r.name).collect()
}

/// Names called as `Name(...)` in `tree` for which `known` holds, in
/// first-call order.
pub fn instantiations(tree: &SourceTree<'_>, known: impl Fn(&str) -> bool) -> IndexSet<SmolStr> {
    let mut found = IndexSet::new();
    walk_preorder(tree.root(), |node| {
        if node.kind() != "call" {
            return;
        }
        if let Some(callee) = node.child_by_field_name("function") {
            if callee.kind() == "identifier" {
                let name = tree.node_text(callee);
                if known(name) {
                    found.insert(SmolStr::new(name));
                }
            }
        }
    });
    found
}

/// Whether an identifier node names something being bound or a member,
/// rather than reading a value.
fn is_binding_position(node: Node<'_>) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    let is_field = |field: &str| parent.child_by_field_name(field) == Some(node);

    match parent.kind() {
        "attribute" => is_field("attribute"),
        "keyword_argument" => is_field("name"),
        "class_definition" | "function_definition" => is_field("name"),
        "default_parameter" | "typed_default_parameter" => is_field("name"),
        "parameters" | "lambda_parameters" => true,
        "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
            parent.parent().is_some_and(|p| {
                matches!(p.kind(), "parameters" | "lambda_parameters" | "typed_parameter")
            }) && !is_inside_type(node, parent)
        }
        "assignment" | "for_statement" | "for_in_clause" => is_field("left"),
        "as_pattern_target" | "global_statement" | "nonlocal_statement" => true,
        "dotted_name" | "aliased_import" => has_import_ancestor(parent),
        _ => false,
    }
}

fn is_inside_type(node: Node<'_>, parent: Node<'_>) -> bool {
    parent.child_by_field_name("type").is_some_and(|ty| {
        ty.start_byte() <= node.start_byte() && node.end_byte() <= ty.end_byte()
    })
}

fn has_import_ancestor(mut node: Node<'_>) -> bool {
    loop {
        if matches!(
            node.kind(),
            "import_statement" | "import_from_statement" | "future_import_statement"
        ) {
            return true;
        }
        match node.parent() {
            Some(parent) => node = parent,
            None => return false,
        }
    }
}

/// Visit `root` and all of its descendants in source order.
fn walk_preorder<'t>(root: Node<'t>, mut visit: impl FnMut(Node<'t>)) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        visit(node);
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
}
