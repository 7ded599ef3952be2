//! Code generation for the compiled node: the wrapper class that runs the
//! subgraph, and the mappings that register it.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use super::plan::{ExecutionPlan, ExposedInput, NodeId};
use super::registry::{NodeRegistry, NodeSpec};
use crate::error::{BundleError, Result};

const INDENT: &str = "    ";
const UNNAMED: &str = "unnamed_node";

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Turn a title into a Python identifier.
///
/// Runs of whitespace, `-`, `:`, `[` and `]` become one `_`, other
/// characters that cannot appear in an identifier are dropped, and a result
/// that cannot start an identifier gets a `_` prefix. An empty result
/// becomes `unnamed_node`.
pub fn sanitize_identifier(title: &str) -> String {
    let sane = sanitize_fragment(title);
    match sane.chars().next() {
        None => UNNAMED.to_string(),
        Some(c) if c == '_' || unicode_ident::is_xid_start(c) => sane,
        Some(_) => format!("_{sane}"),
    }
}

/// [`sanitize_identifier`] without the rules for the first character, for
/// text appended to an identifier.
fn sanitize_fragment(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_separator_run = false;
    for c in text.chars() {
        if c.is_whitespace() || matches!(c, '-' | ':' | '[' | ']') {
            if !in_separator_run {
                out.push('_');
                in_separator_run = true;
            }
            continue;
        }
        in_separator_run = false;
        if c == '_' || unicode_ident::is_xid_continue(c) {
            out.push(c);
        }
    }
    out
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || unicode_ident::is_xid_start(c))
        && chars.all(unicode_ident::is_xid_continue)
}

/// A double-quoted Python string literal.
fn py_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// `(a, b,)`, or `()` when empty.
fn py_tuple(items: &[String]) -> String {
    if items.is_empty() {
        "()".to_string()
    } else {
        format!("({},)", items.join(", "))
    }
}

fn instance_name(title: &str, id: &NodeId) -> String {
    format!("{}_{}", sanitize_identifier(title), sanitize_fragment(&id.to_string()))
}

fn output_name(id: &NodeId, slot: usize) -> String {
    format!("out_{}_{}", sanitize_fragment(&id.to_string()), slot)
}

// ============================================================================
// INPUT EXPOSURE
// ============================================================================

/// The compiled node's inputs: the plan's exposed inputs plus every required
/// node input that is neither linked nor exposed, named
/// `{sanitized_title}_{input}`.
///
/// Fails if a node's class is not in the registry.
pub fn expose_unlinked_inputs(
    plan: &ExecutionPlan,
    registry: &dyn NodeRegistry,
) -> Result<IndexMap<String, ExposedInput>> {
    let mut handled: FxHashSet<(&NodeId, usize)> = FxHashSet::default();
    for link in &plan.internal_links {
        handled.insert((&link.target_id, link.target_slot));
    }
    for input in plan.io_map.inputs.values() {
        handled.insert((&input.target_node_id, input.target_node_slot));
    }

    let mut inputs = plan.io_map.inputs.clone();
    for node in &plan.execution_order {
        let spec = node_spec(registry, &node.class_name)?;
        for (slot, input) in node.inputs.iter().enumerate() {
            if !spec.required_inputs.contains_key(&input.name)
                || handled.contains(&(&node.id, slot))
            {
                continue;
            }
            let mut name = format!(
                "{}_{}",
                sanitize_identifier(&node.title),
                sanitize_fragment(&input.name)
            );
            if inputs.contains_key(&name) {
                name = format!("{}_{}", name, sanitize_fragment(&node.id.to_string()));
            }
            inputs.insert(
                name.clone(),
                ExposedInput {
                    name,
                    slot_type: input.slot_type.clone(),
                    target_node_id: node.id.clone(),
                    target_node_slot: slot,
                    original_class_name: Some(node.class_name.clone()),
                    original_input_name: Some(input.name.clone()),
                },
            );
        }
    }
    Ok(inputs)
}

fn node_spec<'r>(registry: &'r dyn NodeRegistry, class_name: &str) -> Result<&'r NodeSpec> {
    registry.node(class_name).ok_or_else(|| BundleError::UnknownNode {
        class_name: class_name.to_string(),
    })
}

// ============================================================================
// WRAPPER CLASS
// ============================================================================

/// Generated wrapper source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrapperSource {
    /// Sanitized class name of the compiled node.
    pub class_name: String,
    /// The class followed by the registration mappings.
    pub text: String,
}

#[derive(Default)]
struct PyWriter {
    out: String,
}

impl PyWriter {
    fn line(&mut self, depth: usize, text: impl AsRef<str>) {
        for _ in 0..depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }
}

/// One distinct `execute` parameter per exposed input. A key that sanitizes
/// to a name already taken gets its target node id appended, then a counter.
fn parameter_names(inputs: &IndexMap<String, ExposedInput>) -> Vec<String> {
    let mut taken: FxHashSet<String> = FxHashSet::default();
    taken.insert("self".to_string());
    inputs
        .iter()
        .map(|(key, input)| {
            let base = sanitize_identifier(key);
            let mut name = base.clone();
            if taken.contains(&name) {
                name = format!("{}_{}", base, sanitize_fragment(&input.target_node_id.to_string()));
            }
            let mut counter = 2;
            while taken.contains(&name) {
                name = format!("{base}_{counter}");
                counter += 1;
            }
            taken.insert(name.clone());
            name
        })
        .collect()
}

/// Generate the wrapper class for `plan` with the given compiled-node inputs
/// (see [`expose_unlinked_inputs`]).
pub fn generate_wrapper(
    plan: &ExecutionPlan,
    registry: &dyn NodeRegistry,
    inputs: &IndexMap<String, ExposedInput>,
) -> Result<WrapperSource> {
    let class_name = sanitize_identifier(&plan.new_class_name);
    let params = parameter_names(inputs);

    let mut w = PyWriter::default();
    w.line(0, format!("class {class_name}:"));

    w.line(1, "@classmethod");
    w.line(1, "def INPUT_TYPES(s):");
    w.line(2, "return { 'required': {");
    for (param, input) in params.iter().zip(inputs.values()) {
        w.line(3, format!("{}: {},", py_string(param), input_type(registry, input)));
    }
    w.line(2, "} }");
    w.blank();

    let outputs = &plan.io_map.outputs;
    let return_types: Vec<String> = outputs.values().map(|o| py_string(&o.slot_type)).collect();
    let return_names: Vec<String> = outputs.values().map(|o| py_string(&o.name)).collect();
    w.line(1, format!("RETURN_TYPES = {}", py_tuple(&return_types)));
    w.line(1, format!("RETURN_NAMES = {}", py_tuple(&return_names)));
    w.line(1, "FUNCTION = \"execute\"");
    w.line(1, format!("CATEGORY = {}", py_string(&plan.new_category)));
    w.blank();

    let signature = std::iter::once("self".to_string())
        .chain(params.iter().cloned())
        .collect::<Vec<_>>()
        .join(", ");
    w.line(1, format!("def execute({signature}):"));

    let mut output_vars: FxHashMap<&NodeId, Vec<String>> = FxHashMap::default();
    for node in &plan.execution_order {
        let spec = node_spec(registry, &node.class_name)?;
        let instance = instance_name(&node.title, &node.id);

        let mut args: IndexMap<&str, String> = IndexMap::new();
        for link in plan.internal_links.iter().filter(|l| l.target_id == node.id) {
            let Some(input) = node.inputs.get(link.target_slot) else {
                continue;
            };
            if let Some(var) = output_vars
                .get(&link.origin_id)
                .and_then(|vars| vars.get(link.origin_slot))
            {
                args.insert(&input.name, var.clone());
            }
        }
        for (param, exposed) in params.iter().zip(inputs.values()) {
            if exposed.target_node_id != node.id {
                continue;
            }
            if let Some(input) = node.inputs.get(exposed.target_node_slot) {
                args.insert(&input.name, param.clone());
            }
        }

        w.blank();
        w.line(2, format!("# {}", node.title.replace(['\r', '\n'], " ")));
        w.line(2, format!("{instance} = {}()", node.class_name));

        let call = format!("{instance}.{}(", spec.function);
        let returns: Vec<String> = (0..node.outputs.len())
            .map(|slot| output_name(&node.id, slot))
            .collect();
        let head = if returns.is_empty() {
            call
        } else {
            format!("{} = {call}", py_tuple(&returns))
        };
        if args.is_empty() {
            w.line(2, format!("{head})"));
        } else {
            w.line(2, head);
            for (name, value) in &args {
                if is_identifier(name) {
                    w.line(3, format!("{name}={value},"));
                } else {
                    w.line(3, format!("**{{{}: {value}}},", py_string(name)));
                }
            }
            w.line(2, ")");
        }
        output_vars.insert(&node.id, returns);
    }

    let final_returns: Vec<String> = outputs
        .values()
        .filter_map(|o| output_vars.get(&o.origin_node_id)?.get(o.origin_node_slot).cloned())
        .collect();
    w.blank();
    w.line(2, format!("return {}", py_tuple(&final_returns)));
    w.blank();

    w.blank();
    w.line(0, "# --- Node registration ---");
    w.line(0, format!("NODE_CLASS_MAPPINGS = {{ {}: {class_name} }}", py_string(&class_name)));
    w.line(
        0,
        format!(
            "NODE_DISPLAY_NAME_MAPPINGS = {{ {}: {} }}",
            py_string(&class_name),
            py_string(&plan.new_class_name)
        ),
    );

    Ok(WrapperSource {
        class_name,
        text: w.out,
    })
}

/// `(type, config)` for one compiled-node input: the declared type of the
/// node input it came from when the registry knows it, the slot type
/// otherwise.
fn input_type(registry: &dyn NodeRegistry, input: &ExposedInput) -> String {
    let declared = match (&input.original_class_name, &input.original_input_name) {
        (Some(class_name), Some(input_name)) => registry
            .node(class_name)
            .and_then(|spec| spec.input(input_name)),
        _ => None,
    };
    match declared {
        Some(spec) => match &spec.config {
            Some(config) => format!("({}, {})", spec.type_expr, config),
            None => format!("({},)", spec.type_expr),
        },
        None => format!("({},)", py_string(&input.slot_type)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::ModulePath;
    use crate::bundle::plan::{ExposedOutput, InternalLink, PlanNode, Slot};
    use crate::bundle::registry::StaticRegistry;
    use crate::syntax::PythonParser;

    fn slot(name: &str, ty: &str) -> Slot {
        Slot {
            name: name.into(),
            slot_type: ty.into(),
        }
    }

    fn node(
        id: i64,
        class_name: &str,
        title: &str,
        inputs: Vec<Slot>,
        outputs: Vec<Slot>,
    ) -> PlanNode {
        PlanNode {
            id: NodeId::from(id),
            class_name: class_name.into(),
            title: title.into(),
            inputs,
            outputs,
            widgets_values: Vec::new(),
        }
    }

    fn registry() -> StaticRegistry {
        let module = ModulePath::new("nodes");
        StaticRegistry::new()
            .with_node(
                "Loader",
                NodeSpec::new(&module, "load").with_input(
                    "ckpt_name",
                    "\"STRING\"",
                    Some("{\"default\": \"a\"}"),
                ),
            )
            .with_node(
                "Sampler",
                NodeSpec::new(&module, "sample")
                    .with_input("model", "\"MODEL\"", None)
                    .with_input("seed", "\"INT\"", None),
            )
    }

    fn plan() -> ExecutionPlan {
        let mut plan = ExecutionPlan {
            new_class_name: "My Pipeline: v2".into(),
            new_category: "compiled".into(),
            execution_order: vec![
                node(
                    1,
                    "Loader",
                    "Load Model",
                    vec![slot("ckpt_name", "STRING")],
                    vec![slot("MODEL", "MODEL")],
                ),
                node(
                    2,
                    "Sampler",
                    "KSampler",
                    vec![slot("model", "MODEL"), slot("seed", "INT")],
                    vec![slot("LATENT", "LATENT")],
                ),
            ],
            internal_links: vec![InternalLink {
                origin_id: NodeId::from(1),
                origin_slot: 0,
                target_id: NodeId::from(2),
                target_slot: 0,
            }],
            io_map: Default::default(),
        };
        plan.io_map.outputs.insert(
            "latent".into(),
            ExposedOutput {
                name: "latent".into(),
                slot_type: "LATENT".into(),
                origin_node_id: NodeId::from(2),
                origin_node_slot: 0,
            },
        );
        plan
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("My Pipeline: v2"), "My_Pipeline_v2");
        assert_eq!(sanitize_identifier("Load [fast] - x"), "Load_fast_x");
        assert_eq!(sanitize_identifier("3D view"), "_3D_view");
        assert_eq!(sanitize_identifier("a!b"), "ab");
        assert_eq!(sanitize_identifier(""), "unnamed_node");
        assert_eq!(sanitize_identifier("!!!"), "unnamed_node");
    }

    #[test]
    fn test_expose_unlinked_inputs() {
        let inputs = expose_unlinked_inputs(&plan(), &registry()).unwrap();

        let names: Vec<_> = inputs.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["Load_Model_ckpt_name", "KSampler_seed"]);
        assert_eq!(inputs["KSampler_seed"].target_node_slot, 1);
        assert_eq!(inputs["KSampler_seed"].original_class_name.as_deref(), Some("Sampler"));
    }

    #[test]
    fn test_unknown_node_class() {
        let mut plan = plan();
        plan.execution_order[0].class_name = "Missing".into();

        let err = expose_unlinked_inputs(&plan, &registry()).unwrap_err();
        assert!(matches!(err, BundleError::UnknownNode { class_name } if class_name == "Missing"));
    }

    #[test]
    fn test_generate_wrapper() {
        let plan = plan();
        let registry = registry();
        let inputs = expose_unlinked_inputs(&plan, &registry).unwrap();

        let wrapper = generate_wrapper(&plan, &registry, &inputs).unwrap();

        assert_eq!(wrapper.class_name, "My_Pipeline_v2");
        let expected = r#"class My_Pipeline_v2:
    @classmethod
    def INPUT_TYPES(s):
        return { 'required': {
            "Load_Model_ckpt_name": ("STRING", {"default": "a"}),
            "KSampler_seed": ("INT",),
        } }

    RETURN_TYPES = ("LATENT",)
    RETURN_NAMES = ("latent",)
    FUNCTION = "execute"
    CATEGORY = "compiled"

    def execute(self, Load_Model_ckpt_name, KSampler_seed):

        # Load Model
        Load_Model_1 = Loader()
        (out_1_0,) = Load_Model_1.load(
            ckpt_name=Load_Model_ckpt_name,
        )

        # KSampler
        KSampler_2 = Sampler()
        (out_2_0,) = KSampler_2.sample(
            model=out_1_0,
            seed=KSampler_seed,
        )

        return (out_2_0,)


# --- Node registration ---
NODE_CLASS_MAPPINGS = { "My_Pipeline_v2": My_Pipeline_v2 }
NODE_DISPLAY_NAME_MAPPINGS = { "My_Pipeline_v2": "My Pipeline: v2" }
"#;
        assert_eq!(wrapper.text, expected);
    }

    #[test]
    fn test_empty_outputs_and_inputs() {
        let registry = StaticRegistry::new()
            .with_node("Noop", NodeSpec::new(&ModulePath::new("nodes"), "run"));
        let plan = ExecutionPlan {
            new_class_name: "Empty".into(),
            new_category: String::new(),
            execution_order: vec![node(1, "Noop", "", vec![], vec![])],
            internal_links: vec![],
            io_map: Default::default(),
        };

        let wrapper = generate_wrapper(&plan, &registry, &IndexMap::new()).unwrap();

        assert!(wrapper.text.contains("RETURN_TYPES = ()\n"));
        assert!(wrapper.text.contains("def execute(self):\n"));
        assert!(wrapper.text.contains("unnamed_node_1 = Noop()\n        unnamed_node_1.run()\n"));
        assert!(wrapper.text.contains("return ()\n"));
    }

    #[test]
    fn test_colliding_input_keys_get_distinct_parameters() {
        let mut plan = plan();
        for (key, slot) in [("x y", 1), ("x_y", 1), ("self", 0)] {
            plan.io_map.inputs.insert(
                key.into(),
                ExposedInput {
                    name: key.into(),
                    slot_type: "INT".into(),
                    target_node_id: NodeId::from(2),
                    target_node_slot: slot,
                    original_class_name: None,
                    original_input_name: None,
                },
            );
        }

        let wrapper = generate_wrapper(&plan, &registry(), &plan.io_map.inputs).unwrap();

        assert!(wrapper.text.contains("def execute(self, x_y, x_y_2, self_2):\n"));
        assert!(wrapper.text.contains("\"x_y\": (\"INT\",),\n"));
        assert!(wrapper.text.contains("\"x_y_2\": (\"INT\",),\n"));
        let mut parser = PythonParser::new().unwrap();
        assert!(parser.parse(&wrapper.text, "wrapper").is_ok());
    }
}
