//! Node registry: what the wrapper needs to know about each node class.
//!
//! The host application owns the real registry. [`StaticRegistry`] is an
//! in-memory implementation that can be filled by hand, decoded from JSON,
//! or scanned out of the corpus itself by reading each class's `FUNCTION`
//! attribute and `INPUT_TYPES` method.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tree_sitter::Node;

use crate::base::ModulePath;
use crate::config::BundlerConfig;
use crate::error::Result;
use crate::project::CorpusLoader;
use crate::syntax::{DefinitionKind, PythonParser, SourceTree, TopLevelDefinition};

/// Declared type of one required node input.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct InputSpec {
    /// Source text of the type expression, e.g. `"MODEL"` or `IO.INT`.
    pub type_expr: String,
    /// Source text of the options dictionary, if the input declares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

/// What the wrapper needs to call a node class.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodeSpec {
    pub module_path: String,
    /// Name of the method executing the node (`FUNCTION`).
    pub function: String,
    /// Required inputs in declaration order.
    #[serde(default)]
    pub required_inputs: IndexMap<String, InputSpec>,
}

impl NodeSpec {
    pub fn new(module_path: &ModulePath, function: impl Into<String>) -> Self {
        Self {
            module_path: module_path.as_str().to_string(),
            function: function.into(),
            required_inputs: IndexMap::new(),
        }
    }

    pub fn with_input(
        mut self,
        name: impl Into<String>,
        type_expr: impl Into<String>,
        config: Option<&str>,
    ) -> Self {
        self.required_inputs.insert(
            name.into(),
            InputSpec {
                type_expr: type_expr.into(),
                config: config.map(str::to_string),
            },
        );
        self
    }

    pub fn input(&self, name: &str) -> Option<&InputSpec> {
        self.required_inputs.get(name)
    }

    /// Read a node class out of its parsed module.
    ///
    /// Returns `None` unless `definition` is a class with a string `FUNCTION`
    /// attribute. A missing or unreadable `INPUT_TYPES` only leaves the
    /// required inputs empty.
    pub fn from_class(
        tree: &SourceTree<'_>,
        definition: &TopLevelDefinition,
        module_path: &ModulePath,
    ) -> Option<Self> {
        if definition.kind != DefinitionKind::Class {
            return None;
        }
        let class = find_class(tree, &definition.name)?;
        let body = class.child_by_field_name("body")?;
        let function = class_string_attribute(tree, body, "FUNCTION")?;

        let mut spec = Self::new(module_path, function);
        if let Some(required) = required_inputs_dict(tree, body) {
            let mut cursor = required.walk();
            for pair in required.named_children(&mut cursor) {
                if pair.kind() != "pair" {
                    continue;
                }
                let (Some(key), Some(value)) = (
                    pair.child_by_field_name("key"),
                    pair.child_by_field_name("value"),
                ) else {
                    continue;
                };
                let Some(name) = string_value(tree.node_text(key)) else {
                    continue;
                };
                if let Some(input) = input_spec(tree, value) {
                    spec.required_inputs.insert(name.to_string(), input);
                }
            }
        }
        Some(spec)
    }
}

/// Lookup of node classes by name.
pub trait NodeRegistry {
    fn node(&self, class_name: &str) -> Option<&NodeSpec>;

    fn contains(&self, class_name: &str) -> bool {
        self.node(class_name).is_some()
    }
}

/// A registry held in memory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct StaticRegistry {
    nodes: IndexMap<String, NodeSpec>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class_name: impl Into<String>, spec: NodeSpec) {
        self.nodes.insert(class_name.into(), spec);
    }

    pub fn with_node(mut self, class_name: impl Into<String>, spec: NodeSpec) -> Self {
        self.register(class_name, spec);
        self
    }

    /// Register every node class of a parsed module, skipping classes that
    /// are not nodes. Returns how many were registered.
    pub fn register_module(&mut self, tree: &SourceTree<'_>, module_path: &ModulePath) -> usize {
        let mut registered = 0;
        for definition in tree.definitions() {
            if let Some(spec) = NodeSpec::from_class(tree, &definition, module_path) {
                debug!(class = %definition.name, module = %module_path, "registered node class");
                self.register(definition.name.to_string(), spec);
                registered += 1;
            }
        }
        registered
    }

    /// Scan every corpus module for node classes. Later modules win when two
    /// define the same class name.
    pub fn scan_corpus(config: &BundlerConfig) -> Result<Self> {
        let loader = CorpusLoader::new(config);
        let mut parser = PythonParser::new()?;
        let mut registry = Self::new();

        for path in loader.collect_source_files() {
            let Some(module_path) = ModulePath::from_file(&config.base_root, &path) else {
                continue;
            };
            let Ok(text) = loader.read(&path) else {
                debug!(path = %path.display(), "skipping unreadable module");
                continue;
            };
            if loader.is_generated(&text) {
                continue;
            }
            if let Ok(tree) = parser.parse(&text, &path.to_string_lossy()) {
                registry.register_module(&tree, &module_path);
            }
        }
        info!(nodes = registry.len(), "scanned corpus for node classes");
        Ok(registry)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl NodeRegistry for StaticRegistry {
    fn node(&self, class_name: &str) -> Option<&NodeSpec> {
        self.nodes.get(class_name)
    }
}

// ============================================================================
// CLASS BODY EXTRACTION
// ============================================================================

fn find_class<'t>(tree: &'t SourceTree<'_>, name: &str) -> Option<Node<'t>> {
    let root = tree.root();
    let mut cursor = root.walk();
    root.named_children(&mut cursor).find_map(|node| {
        let class = match node.kind() {
            "decorated_definition" => node.child_by_field_name("definition")?,
            _ => node,
        };
        let class_name = class.child_by_field_name("name")?;
        (class.kind() == "class_definition" && tree.node_text(class_name) == name).then_some(class)
    })
}

/// The string assigned to `attribute` directly in a class body.
fn class_string_attribute<'s>(
    tree: &SourceTree<'s>,
    body: Node<'_>,
    attribute: &str,
) -> Option<&'s str> {
    let mut cursor = body.walk();
    let value = body.named_children(&mut cursor).find_map(|statement| {
        if statement.kind() != "expression_statement" {
            return None;
        }
        let assignment = first_named_child(statement)?;
        if assignment.kind() != "assignment" {
            return None;
        }
        let left = assignment.child_by_field_name("left")?;
        if tree.node_text(left) != attribute {
            return None;
        }
        assignment.child_by_field_name("right")
    })?;
    string_value(tree.node_text(value))
}

/// The dictionary under `'required'` in the dict returned by `INPUT_TYPES`.
fn required_inputs_dict<'t>(tree: &SourceTree<'_>, body: Node<'t>) -> Option<Node<'t>> {
    let mut cursor = body.walk();
    let method = body.named_children(&mut cursor).find_map(|node| {
        let def = match node.kind() {
            "decorated_definition" => node.child_by_field_name("definition")?,
            _ => node,
        };
        let name = def.child_by_field_name("name")?;
        (def.kind() == "function_definition" && tree.node_text(name) == "INPUT_TYPES")
            .then_some(def)
    })?;

    let block = method.child_by_field_name("body")?;
    let mut cursor = block.walk();
    let returned = block
        .named_children(&mut cursor)
        .filter(|statement| statement.kind() == "return_statement")
        .find_map(first_named_child)
        .filter(|value| value.kind() == "dictionary")?;

    let mut cursor = returned.walk();
    let required = returned.named_children(&mut cursor).find_map(|pair| {
        let key = pair.child_by_field_name("key")?;
        (pair.kind() == "pair" && string_value(tree.node_text(key)) == Some("required"))
            .then(|| pair.child_by_field_name("value"))
            .flatten()
    })?;
    (required.kind() == "dictionary").then_some(required)
}

fn first_named_child(node: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).next()
}

/// `(type, {options})` → type expression and options source text.
fn input_spec(tree: &SourceTree<'_>, value: Node<'_>) -> Option<InputSpec> {
    if value.kind() != "tuple" {
        return None;
    }
    let mut cursor = value.walk();
    let mut elements = value.named_children(&mut cursor).filter(|n| n.kind() != "comment");
    let type_expr = tree.node_text(elements.next()?).to_string();
    let config = elements.next().map(|n| tree.node_text(n).to_string());
    Some(InputSpec { type_expr, config })
}

/// The value of a plain Python string literal, without prefix or quotes.
fn string_value(literal: &str) -> Option<&str> {
    let unprefixed = literal.trim_start_matches(|c: char| matches!(c, 'r' | 'R' | 'u' | 'U'));
    ["\"\"\"", "'''", "\"", "'"].iter().find_map(|quote| {
        unprefixed
            .strip_prefix(quote)?
            .strip_suffix(quote)
            .filter(|_| unprefixed.len() >= 2 * quote.len())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::PythonParser;

    const NODES: &str = r#"
import folder_paths

class CheckpointLoader:
    @classmethod
    def INPUT_TYPES(s):
        return {"required": {
            "ckpt_name": (folder_paths.get_filename_list("checkpoints"), ),
            "strength": ("FLOAT", {"default": 1.0, "min": 0.0}),
        }}

    RETURN_TYPES = ("MODEL",)
    FUNCTION = "load_checkpoint"

    def load_checkpoint(self, ckpt_name, strength):
        pass

class NotANode:
    pass
"#;

    #[test]
    fn test_string_value() {
        assert_eq!(string_value("\"load\""), Some("load"));
        assert_eq!(string_value("'load'"), Some("load"));
        assert_eq!(string_value("r'''x'''"), Some("x"));
        assert_eq!(string_value("load"), None);
        assert_eq!(string_value("\""), None);
    }

    #[test]
    fn test_register_module() {
        let mut parser = PythonParser::new().unwrap();
        let tree = parser.parse(NODES, "nodes.py").unwrap();
        let module = ModulePath::new("nodes");

        let mut registry = StaticRegistry::new();
        assert_eq!(registry.register_module(&tree, &module), 1);

        let spec = registry.node("CheckpointLoader").unwrap();
        assert_eq!(spec.function, "load_checkpoint");
        assert_eq!(spec.module_path, "nodes");
        assert_eq!(
            spec.input("ckpt_name").unwrap().type_expr,
            "folder_paths.get_filename_list(\"checkpoints\")"
        );
        assert_eq!(spec.input("ckpt_name").unwrap().config, None);

        let strength = spec.input("strength").unwrap();
        assert_eq!(strength.type_expr, "\"FLOAT\"");
        assert_eq!(strength.config.as_deref(), Some("{\"default\": 1.0, \"min\": 0.0}"));
        assert!(!registry.contains("NotANode"));
    }

    #[test]
    fn test_scan_corpus() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("nodes.py"), NODES).unwrap();
        std::fs::write(dir.path().join("helpers.py"), "def helper():\n    pass\n").unwrap();

        let registry = StaticRegistry::scan_corpus(&BundlerConfig::for_root(dir.path())).unwrap();

        assert_eq!(registry.class_names().collect::<Vec<_>>(), vec!["CheckpointLoader"]);
    }

    #[test]
    fn test_registry_from_json() {
        let registry: StaticRegistry = serde_json::from_str(
            r#"{"VAELoader": {"module_path": "nodes", "function": "load_vae",
                "required_inputs": {"vae_name": {"type_expr": "\"STRING\""}}}}"#,
        )
        .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.node("VAELoader").unwrap().function, "load_vae");
    }
}
