//! Turning an execution plan into a single generated node file.
//!
//! - [`plan`](ExecutionPlan) - the request: nodes, links, exposed I/O
//! - [`NodeRegistry`] - what each node class expects
//! - [`generate_wrapper`] - the class that runs the subgraph
//! - [`Compiler`] - the whole pipeline, from plan to [`CompiledBundle`]

mod assemble;
mod patch;
mod plan;
mod registry;
mod wrapper;

pub use assemble::{CompiledBundle, Compiler, NodeSource};
pub use patch::{BundlePatch, LiteralPatch, apply_patches};
pub use plan::{
    ExecutionPlan, ExposedInput, ExposedOutput, InternalLink, IoMap, NodeId, PlanNode, Slot,
};
pub use registry::{InputSpec, NodeRegistry, NodeSpec, StaticRegistry};
pub use wrapper::{WrapperSource, expose_unlinked_inputs, generate_wrapper, sanitize_identifier};
