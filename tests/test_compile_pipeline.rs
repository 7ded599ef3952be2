//! End-to-end compilation of execution plans against a small corpus.
//!
//! The corpus is written once into a temporary directory and shared by every
//! test, together with its index cache and the registry scanned out of it.

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use rstest::rstest;
use subgraph::bundle::LiteralPatch;
use subgraph::hir::diagnostics::codes;
use subgraph::{
    BundleError, BundlerConfig, CompiledBundle, Compiler, IndexCache, ModulePath, NodeRegistry,
    NodeSpec, StaticRegistry,
};
use tempfile::TempDir;

// ============================================================================
// FIXTURES
// ============================================================================

const NODES_PY: &str = r#"import torch
import os
from .local import thing


class Helper:
    def scale(self, factor):
        return torch.ones(1) * factor


def unused_helper():
    return os.getcwd()


class LoadThing:
    @classmethod
    def INPUT_TYPES(s):
        return {"required": {"path_name": ("STRING", {"default": "a.bin"})}}

    RETURN_TYPES = ("THING",)
    FUNCTION = "load"

    def load(self, path_name):
        return (Helper().scale(2),)


class UseThing:
    @classmethod
    def INPUT_TYPES(s):
        return {"required": {"thing": ("THING",), "factor": ("FLOAT",)}}

    RETURN_TYPES = ("THING",)
    FUNCTION = "use"

    def use(self, thing, factor):
        return (combine(thing, factor),)


def combine(a, b):
    return a * b
"#;

const CORE_UTIL_PY: &str = "class Util:\n    kind = 'core'\n";

const EXPERIMENTAL_UTIL_PY: &str = r#"class Util:
    kind = 'experimental'


class Fancy:
    RETURN_TYPES = ("UTIL",)
    FUNCTION = "make"

    def make(self):
        return (Util(),)
"#;

const LOOP_PY: &str = r#"class Ping:
    FUNCTION = "run"

    def run(self):
        return (Pong().back(),)


class Pong:
    def back(self):
        return Ping()
"#;

const THING_PLAN: &str = r#"{
    "newClassName": "Thing Pipeline",
    "newCategory": "compiled/things",
    "executionOrder": [
        {"id": 1, "class_name": "LoadThing", "title": "Load Thing",
         "inputs": [{"name": "path_name", "type": "STRING"}],
         "outputs": [{"name": "THING", "type": "THING"}]},
        {"id": 2, "class_name": "UseThing", "title": "Use Thing",
         "inputs": [{"name": "thing", "type": "THING"}, {"name": "factor", "type": "FLOAT"}],
         "outputs": [{"name": "THING", "type": "THING"}]}
    ],
    "internalLinks": [{"origin_id": 1, "origin_slot": 0, "target_id": 2, "target_slot": 0}],
    "ioMap": {
        "outputs": {"result": {"name": "result", "type": "THING", "originNodeId": 2, "originNodeSlot": 0}}
    }
}"#;

const FANCY_PLAN: &str = r#"{
    "newClassName": "Fancy Pipeline",
    "newCategory": "compiled",
    "executionOrder": [
        {"id": 1, "class_name": "Fancy", "title": "Make Util",
         "outputs": [{"name": "UTIL", "type": "UTIL"}]}
    ],
    "ioMap": {
        "outputs": {"util": {"name": "util", "type": "UTIL", "originNodeId": 1, "originNodeSlot": 0}}
    }
}"#;

const PING_PLAN: &str = r#"{
    "newClassName": "Ping Pipeline",
    "executionOrder": [{"id": 1, "class_name": "Ping", "title": "Ping"}]
}"#;

struct Corpus {
    _dir: TempDir,
    config: BundlerConfig,
    registry: StaticRegistry,
    cache: IndexCache,
}

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn config_for(root: &Path) -> BundlerConfig {
    BundlerConfig::for_root(root)
        .with_known_collisions(["Util"])
        .with_primary_tag("core")
}

static CORPUS: Lazy<Corpus> = Lazy::new(|| {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "nodes.py", NODES_PY);
    write(dir.path(), "core/util.py", CORE_UTIL_PY);
    write(dir.path(), "experimental/util.py", EXPERIMENTAL_UTIL_PY);
    write(dir.path(), "loop.py", LOOP_PY);

    let config = config_for(dir.path());
    let registry = StaticRegistry::scan_corpus(&config).unwrap();
    Corpus {
        _dir: dir,
        config,
        registry,
        cache: IndexCache::new(),
    }
});

fn compile(plan: &str) -> CompiledBundle {
    let corpus = &*CORPUS;
    Compiler::new(&corpus.config, &corpus.cache, &corpus.registry)
        .compile_json(plan)
        .unwrap()
}

fn position(bundle: &CompiledBundle, name: &str) -> usize {
    bundle
        .definitions
        .iter()
        .position(|d| d == name)
        .unwrap_or_else(|| panic!("{name} missing from {:?}", bundle.definitions))
}

// ============================================================================
// RESOLUTION AND ORDERING
// ============================================================================

#[test]
fn test_registry_scanned_from_corpus() {
    let registry = &CORPUS.registry;

    assert_eq!(registry.node("LoadThing").unwrap().function, "load");
    assert_eq!(registry.node("Fancy").unwrap().function, "make");
    assert_eq!(registry.node("Ping").unwrap().function, "run");
    assert!(registry.node("Helper").is_none());
}

#[test]
fn test_dependencies_are_emitted_before_dependents() {
    let bundle = compile(THING_PLAN);

    assert_eq!(bundle.class_name, "Thing_Pipeline");
    assert!(position(&bundle, "Helper") < position(&bundle, "LoadThing"));
    assert!(position(&bundle, "combine") < position(&bundle, "UseThing"));
    assert!(!bundle.has_definition("unused_helper"));
    assert!(bundle.diagnostics.is_empty(), "{:?}", bundle.diagnostics);
}

#[test]
fn test_definitions_are_never_duplicated() {
    let bundle = compile(THING_PLAN);

    let mut names = bundle.definitions.clone();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), bundle.definitions.len());
    assert_eq!(bundle.source.matches("class Helper:").count(), 1);
    assert_eq!(bundle.source.matches("def combine(").count(), 1);
}

#[test]
fn test_imports_are_pruned_to_used_modules() {
    let bundle = compile(THING_PLAN);

    assert!(bundle.source.contains("\nimport torch\n"));
    assert!(!bundle.source.contains("import os"));
    assert!(!bundle.source.contains("from .local"));
    assert!(!bundle.source.contains("import folder_paths"));
}

#[test]
fn test_wrapper_exposes_unlinked_inputs() {
    let bundle = compile(THING_PLAN);

    assert!(bundle
        .source
        .contains("\"Load_Thing_path_name\": (\"STRING\", {\"default\": \"a.bin\"}),"));
    assert!(bundle.source.contains("\"Use_Thing_factor\": (\"FLOAT\",),"));
    assert!(bundle
        .source
        .contains("def execute(self, Load_Thing_path_name, Use_Thing_factor):"));
    assert!(bundle.source.contains("thing=out_1_0,"));
    assert!(bundle.source.contains("return (out_2_0,)"));
}

#[test]
fn test_cycle_falls_back_to_discovery_order() {
    let bundle = compile(PING_PLAN);

    assert_eq!(bundle.definitions, vec!["Ping", "Pong"]);
    let cycles: Vec<_> = bundle
        .diagnostics
        .iter()
        .filter(|d| d.code == codes::CYCLE_DETECTED)
        .collect();
    assert_eq!(cycles.len(), 1);
}

// ============================================================================
// COLLISIONS
// ============================================================================

#[test]
fn test_collision_variant_rewritten_and_canonical_pruned() {
    let bundle = compile(FANCY_PLAN);

    assert_eq!(bundle.definitions, vec!["Util_experimental", "Fancy"]);
    assert!(bundle.source.contains("return (Util_experimental(),)"));
    assert!(!bundle.source.contains("kind = 'core'"));
}

#[test]
fn test_instantiated_collision_keeps_every_variant() {
    let runnable = "class Util:\n    FUNCTION = \"run\"\n\n    def run(self):\n        return ()\n";
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "core/util.py", runnable);
    write(dir.path(), "experimental/util.py", runnable);
    let config = config_for(dir.path());
    let registry = StaticRegistry::scan_corpus(&config).unwrap();

    let bundle = Compiler::new(&config, &IndexCache::new(), &registry)
        .compile_json(
            r#"{
                "newClassName": "Util Pipeline",
                "executionOrder": [{"id": 1, "class_name": "Util", "title": "Util"}]
            }"#,
        )
        .unwrap();

    assert!(bundle.has_definition("Util"), "{:?}", bundle.definitions);
    assert!(bundle.has_definition("Util_experimental"), "{:?}", bundle.definitions);
    assert!(bundle.source.contains("class Util_experimental:"));
    assert!(bundle.source.contains("Util_1 = Util()"));
}

#[test]
fn test_full_artifact_text() {
    let bundle = compile(FANCY_PLAN);

    let expected = r#"# Generated by Subgraph Compiler

# --- Internal node definitions and their dependencies ---
class Util_experimental:
    kind = 'experimental'

class Fancy:
    RETURN_TYPES = ("UTIL",)
    FUNCTION = "make"

    def make(self):
        return (Util_experimental(),)


# --- Compiled node ---
class Fancy_Pipeline:
    @classmethod
    def INPUT_TYPES(s):
        return { 'required': {
        } }

    RETURN_TYPES = ("UTIL",)
    RETURN_NAMES = ("util",)
    FUNCTION = "execute"
    CATEGORY = "compiled"

    def execute(self):

        # Make Util
        Make_Util_1 = Fancy()
        (out_1_0,) = Make_Util_1.make()

        return (out_1_0,)


# --- Node registration ---
NODE_CLASS_MAPPINGS = { "Fancy_Pipeline": Fancy_Pipeline }
NODE_DISPLAY_NAME_MAPPINGS = { "Fancy_Pipeline": "Fancy Pipeline" }
"#;
    assert_eq!(bundle.source, expected);
}

// ============================================================================
// DEGRADED REQUESTS
// ============================================================================

#[test]
fn test_unknown_corpus_symbol_is_reported_not_fatal() {
    let corpus = &*CORPUS;
    let registry = corpus
        .registry
        .clone()
        .with_node("Ghost", NodeSpec::new(&ModulePath::new("elsewhere"), "haunt"));
    let plan = r#"{
        "newClassName": "Haunted",
        "executionOrder": [
            {"id": 1, "class_name": "LoadThing", "title": "Load",
             "inputs": [{"name": "path_name", "type": "STRING"}]},
            {"id": 2, "class_name": "Ghost", "title": "Ghost"}
        ]
    }"#;

    let bundle = Compiler::new(&corpus.config, &corpus.cache, &registry)
        .compile_json(plan)
        .unwrap();

    assert!(bundle.has_definition("LoadThing"));
    assert!(bundle.has_definition("Helper"));
    assert!(bundle.source.contains("Ghost_2 = Ghost()"));
    assert!(!bundle.source.contains("class Ghost"));
    let missing: Vec<_> = bundle
        .diagnostics
        .iter()
        .filter(|d| d.code == codes::NOT_FOUND)
        .collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].symbol.as_deref(), Some("Ghost"));
}

#[rstest]
#[case::unregistered_class(
    r#"{"newClassName": "X", "executionOrder": [{"id": 1, "class_name": "Nope"}]}"#
)]
#[case::empty_plan(r#"{"newClassName": "X", "executionOrder": []}"#)]
#[case::malformed_json(r#"{"newClassName": "#)]
fn test_fatal_requests(#[case] plan: &str) {
    let corpus = &*CORPUS;
    let result = Compiler::new(&corpus.config, &corpus.cache, &corpus.registry).compile_json(plan);

    let err = result.unwrap_err();
    assert!(err.is_fatal(), "{err}");
    assert!(matches!(
        err,
        BundleError::UnknownNode { .. } | BundleError::InvalidPlan(_) | BundleError::Json(_)
    ));
}

// ============================================================================
// PATCHES AND PRUNING
// ============================================================================

#[test]
fn test_patch_makes_definition_unreachable() {
    let corpus = &*CORPUS;
    let bundle = Compiler::new(&corpus.config, &corpus.cache, &corpus.registry)
        .with_patch(LiteralPatch::new("inline-scale", "Helper().scale(2)", "2"))
        .compile_json(THING_PLAN)
        .unwrap();

    assert!(!bundle.has_definition("Helper"));
    assert!(!bundle.source.contains("Helper"));
    assert!(bundle.source.contains("return (2,)"));
    // torch was only used by Helper
    assert!(!bundle.source.contains("import torch"));
    assert!(bundle.has_definition("combine"));
}

// ============================================================================
// DETERMINISM
// ============================================================================

#[test]
fn test_compiling_twice_is_identical() {
    let first = compile(THING_PLAN);
    let second = compile(THING_PLAN);

    assert_eq!(first.source, second.source);
    assert_eq!(first.definitions, second.definitions);
}

#[test]
fn test_generated_output_does_not_feed_back_into_corpus() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "core/util.py", CORE_UTIL_PY);
    write(dir.path(), "experimental/util.py", EXPERIMENTAL_UTIL_PY);
    let config = config_for(dir.path());
    let registry = StaticRegistry::scan_corpus(&config).unwrap();

    let first = Compiler::new(&config, &IndexCache::new(), &registry)
        .compile_json(FANCY_PLAN)
        .unwrap();
    write(dir.path(), "custom_nodes/fancy_pipeline.py", &first.source);

    let registry = StaticRegistry::scan_corpus(&config).unwrap();
    assert!(registry.node("Fancy_Pipeline").is_none());
    let second = Compiler::new(&config, &IndexCache::new(), &registry)
        .compile_json(FANCY_PLAN)
        .unwrap();

    assert_eq!(first.source, second.source);
    assert!(second.diagnostics.is_empty(), "{:?}", second.diagnostics);
}

// ============================================================================
// NODE SOURCE
// ============================================================================

#[test]
fn test_node_source() {
    let corpus = &*CORPUS;
    let compiler = Compiler::new(&corpus.config, &corpus.cache, &corpus.registry);

    let source = compiler.node_source("LoadThing").unwrap();
    assert!(source.file_path.ends_with("nodes.py"));
    assert!(source.source_code.starts_with("class LoadThing:"));
    assert!(source.source_code.ends_with("return (Helper().scale(2),)"));
    assert_eq!(source.function.as_deref(), Some("load"));

    let json = serde_json::to_value(&source).unwrap();
    assert_eq!(json["FUNCTION"], "load");
    assert_eq!(json["class_name"], "LoadThing");
}

#[test]
fn test_node_source_uses_canonical_variant() {
    let corpus = &*CORPUS;
    let compiler = Compiler::new(&corpus.config, &corpus.cache, &corpus.registry);

    let source = compiler.node_source("Util").unwrap();
    assert_eq!(source.source_code, "class Util:\n    kind = 'core'");
    assert_eq!(source.function, None);

    assert!(matches!(
        compiler.node_source("Ghost"),
        Err(BundleError::NotFound { .. })
    ));
}
