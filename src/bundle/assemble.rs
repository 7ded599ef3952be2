//! The compiler: one execution plan in, one self-contained source file out.
//!
//! ## Pipeline
//!
//! 1. validate the plan and expose unlinked required inputs
//! 2. resolve the plan's node classes against the cached corpus index
//! 3. apply patches, build the final graph, order the definitions
//! 4. generate the wrapper class and find its entry points
//! 5. prune unreachable definitions, then unused imports
//! 6. render the artifact
//!
//! Only request-level failures are errors. Everything that goes wrong for a
//! single symbol or phase degrades the bundle and is reported in
//! [`CompiledBundle::diagnostics`].

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Serialize;
use indexmap::IndexSet;
use smol_str::SmolStr;
use tracing::{debug, info, warn};

use super::patch::{BundlePatch, apply_patches};
use super::plan::ExecutionPlan;
use super::registry::{NodeRegistry, NodeSpec};
use super::wrapper::{expose_unlinked_inputs, generate_wrapper};
use crate::config::BundlerConfig;
use crate::error::{BundleError, Result};
use crate::hir::{
    CorpusIndex, DependencyGraph, Diagnostic, DiagnosticCollector, IndexCache, RenameMap, Resolver,
    build_final_graph, locate_source, order_definitions, prune_dead_code, prune_imports,
    reorder_bundle,
};
use crate::syntax::{ITEM_SEPARATOR, PythonParser, instantiations};

const DEFINITIONS_HEADER: &str = "# --- Internal node definitions and their dependencies ---";
const WRAPPER_HEADER: &str = "# --- Compiled node ---";
const FUTURE_IMPORT_PREFIX: &str = "from __future__";

/// A compiled subgraph.
#[derive(Clone, Debug)]
pub struct CompiledBundle {
    /// Class name of the compiled node.
    pub class_name: String,
    /// The complete generated file.
    pub source: String,
    /// Definitions emitted before the wrapper, in order.
    pub definitions: Vec<SmolStr>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompiledBundle {
    pub fn has_definition(&self, name: &str) -> bool {
        self.definitions.iter().any(|d| d == name)
    }
}

/// Source of one node class, as shown to the user before compiling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeSource {
    pub class_name: String,
    pub file_path: PathBuf,
    pub source_code: String,
    /// The class's execution method, when it declares one.
    #[serde(rename = "FUNCTION")]
    pub function: Option<String>,
}

/// Compiles execution plans against a corpus.
pub struct Compiler<'a> {
    config: &'a BundlerConfig,
    cache: &'a IndexCache,
    registry: &'a dyn NodeRegistry,
    patches: Vec<Box<dyn BundlePatch>>,
}

impl<'a> Compiler<'a> {
    pub fn new(
        config: &'a BundlerConfig,
        cache: &'a IndexCache,
        registry: &'a dyn NodeRegistry,
    ) -> Self {
        Self {
            config,
            cache,
            registry,
            patches: Vec::new(),
        }
    }

    /// Register a patch; patches run in registration order.
    pub fn with_patch(mut self, patch: impl BundlePatch + 'static) -> Self {
        self.patches.push(Box::new(patch));
        self
    }

    /// Decode a JSON execution plan and compile it.
    pub fn compile_json(&self, body: &str) -> Result<CompiledBundle> {
        let plan = ExecutionPlan::from_json(body)?;
        self.compile(&plan)
    }

    pub fn compile(&self, plan: &ExecutionPlan) -> Result<CompiledBundle> {
        plan.validate()?;
        let inputs = expose_unlinked_inputs(plan, self.registry)?;
        let wrapper = generate_wrapper(plan, self.registry, &inputs)?;

        let index = self.cache.get_or_build(self.config);
        let mut parser = PythonParser::new()?;

        let resolution = Resolver::new(&index, self.config)?.resolve(plan.class_names());
        let mut diagnostics = resolution.diagnostics.clone();

        let text = apply_patches(resolution.bundle_text(), &self.patches);
        let graph = build_final_graph(&text);
        let ordered = match &graph {
            Some(graph) => self.order(&mut parser, text, graph, &mut diagnostics),
            None => text,
        };

        let entry_points =
            find_entry_points(&mut parser, &wrapper.text, &index, &resolution.renames);
        let outcome = prune_dead_code(&mut parser, &ordered, graph.as_ref(), &entry_points);
        if let Some(reason) = outcome.skip_reason() {
            info!(reason = %reason, "dead code pruning skipped");
            diagnostics.record(reason, None);
        }
        let definitions_text = outcome.into_text();

        let mut imports = resolution.imports.clone();
        imports.extend(self.config.base_imports.iter().cloned());
        let usage = [definitions_text.as_str(), wrapper.text.as_str()].join(ITEM_SEPARATOR);
        let imports =
            prune_imports(&mut parser, &usage, &imports, &self.config.always_ignored_imports);

        let definitions: Vec<SmolStr> = parser
            .parse(&definitions_text, "bundle")
            .map(|tree| tree.definitions().into_iter().map(|d| d.name).collect())
            .unwrap_or_default();

        let source = render_artifact(
            &self.config.generated_marker,
            &imports,
            &definitions_text,
            &wrapper.text,
        );
        info!(
            class = %wrapper.class_name,
            definitions = definitions.len(),
            imports = imports.len(),
            diagnostics = diagnostics.diagnostics().len(),
            "compiled subgraph"
        );

        Ok(CompiledBundle {
            class_name: wrapper.class_name,
            source,
            definitions,
            diagnostics: diagnostics.into_vec(),
        })
    }

    fn order(
        &self,
        parser: &mut PythonParser,
        text: String,
        graph: &DependencyGraph,
        diagnostics: &mut DiagnosticCollector,
    ) -> String {
        let ordering = order_definitions(graph);
        if let Some(name) = &ordering.cycle {
            diagnostics.record(&BundleError::CycleDetected { name: name.clone() }, None);
        }
        match reorder_bundle(parser, &text, &ordering) {
            Ok(ordered) => ordered,
            Err(err) => {
                warn!(error = %err, "could not reorder bundle, keeping discovery order");
                diagnostics.record(&err, None);
                text
            }
        }
    }

    /// The source of `class_name` as it is defined in the corpus (the
    /// canonical variant for a known collision).
    pub fn node_source(&self, class_name: &str) -> Result<NodeSource> {
        let not_found = || BundleError::NotFound {
            name: SmolStr::new(class_name),
        };
        let index = self.cache.get_or_build(self.config);
        let variant = index
            .class(class_name)
            .ok_or_else(not_found)?
            .variants(class_name, &self.config.primary_tag)
            .into_iter()
            .find(|v| !v.is_renamed(class_name))
            .ok_or_else(not_found)?;

        let path = locate_source(&variant.module_path, &self.config.base_root)?;
        let text = std::fs::read_to_string(&path).map_err(|e| BundleError::io(&path, e))?;
        let mut parser = PythonParser::new()?;
        let tree = parser.parse(&text, &path.to_string_lossy())?;
        let definition = tree
            .definition(class_name)
            .ok_or_else(|| BundleError::MissingDefinition {
                name: SmolStr::new(class_name),
                path: path.clone(),
            })?;

        let function = NodeSpec::from_class(&tree, &definition, &variant.module_path)
            .map(|spec| spec.function)
            .or_else(|| self.registry.node(class_name).map(|spec| spec.function.clone()));

        Ok(NodeSource {
            class_name: class_name.to_string(),
            source_code: tree.slice(definition.range).to_string(),
            file_path: path,
            function,
        })
    }
}

/// Bundle definitions the wrapper instantiates. A collided name also pulls
/// in every renamed variant recorded for it.
fn find_entry_points(
    parser: &mut PythonParser,
    wrapper_text: &str,
    index: &CorpusIndex,
    renames: &RenameMap,
) -> Vec<SmolStr> {
    match parser.parse(wrapper_text, "wrapper") {
        Ok(tree) => {
            let mut entries: IndexSet<SmolStr> = IndexSet::new();
            for name in instantiations(&tree, |name| index.contains(name)) {
                if index.lookup(&name).is_some_and(|entry| entry.is_collision()) {
                    entries.extend(renames.variants_of(&name).cloned());
                }
                entries.insert(name);
            }
            let entries: Vec<SmolStr> = entries.into_iter().collect();
            debug!(entries = ?entries, "wrapper entry points");
            entries
        }
        Err(err) => {
            warn!(error = %err, "generated wrapper does not parse");
            Vec::new()
        }
    }
}

/// Marker, imports (`from __future__` first), definitions, wrapper.
fn render_artifact(
    marker: &str,
    imports: &BTreeSet<String>,
    definitions: &str,
    wrapper: &str,
) -> String {
    let (future, other): (Vec<&String>, Vec<&String>) = imports
        .iter()
        .partition(|import| import.starts_with(FUTURE_IMPORT_PREFIX));

    let mut out = String::new();
    out.push_str(marker);
    out.push('\n');
    for import in future.into_iter().chain(other) {
        out.push_str(import);
        out.push('\n');
    }
    out.push('\n');

    if !definitions.trim().is_empty() {
        out.push_str(DEFINITIONS_HEADER);
        out.push('\n');
        out.push_str(definitions.trim_end());
        out.push_str("\n\n\n");
    }

    out.push_str(WRAPPER_HEADER);
    out.push('\n');
    out.push_str(wrapper);
    out
}
