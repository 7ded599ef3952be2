//! The execution plan sent by the front end: which nodes the subgraph
//! contains, how they are wired and what the compiled node exposes.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{BundleError, Result};

/// Node identifier. The front end sends numbers, but strings are accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum NodeId {
    Number(i64),
    Text(String),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for NodeId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// A named, typed input or output slot of a node.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Slot {
    pub name: String,
    #[serde(rename = "type", default)]
    pub slot_type: String,
}

/// One node of the subgraph, in execution order.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PlanNode {
    pub id: NodeId,
    pub class_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub inputs: Vec<Slot>,
    #[serde(default)]
    pub outputs: Vec<Slot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub widgets_values: Vec<serde_json::Value>,
}

/// An edge between two nodes inside the subgraph.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct InternalLink {
    pub origin_id: NodeId,
    pub origin_slot: usize,
    pub target_id: NodeId,
    pub target_slot: usize,
}

/// An input of the compiled node, feeding one node input.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposedInput {
    pub name: String,
    #[serde(rename = "type", default)]
    pub slot_type: String,
    pub target_node_id: NodeId,
    pub target_node_slot: usize,
    /// Class and input the exposed input originally belonged to, used to
    /// copy its declared type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_input_name: Option<String>,
}

/// An output of the compiled node, taken from one node output.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposedOutput {
    pub name: String,
    #[serde(rename = "type", default)]
    pub slot_type: String,
    pub origin_node_id: NodeId,
    pub origin_node_slot: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct IoMap {
    #[serde(default)]
    pub inputs: IndexMap<String, ExposedInput>,
    #[serde(default)]
    pub outputs: IndexMap<String, ExposedOutput>,
}

/// A subgraph to compile into one node.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    /// Display name of the compiled node; sanitized into its class name.
    pub new_class_name: String,
    #[serde(default)]
    pub new_category: String,
    pub execution_order: Vec<PlanNode>,
    #[serde(default)]
    pub internal_links: Vec<InternalLink>,
    #[serde(default)]
    pub io_map: IoMap,
}

impl ExecutionPlan {
    /// Decode and validate a plan.
    pub fn from_json(body: &str) -> Result<Self> {
        let plan: Self = serde_json::from_str(body)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn node(&self, id: &NodeId) -> Option<&PlanNode> {
        self.execution_order.iter().find(|node| &node.id == id)
    }

    /// Distinct node classes used by the plan; the resolver's entry names.
    pub fn class_names(&self) -> BTreeSet<String> {
        self.execution_order
            .iter()
            .map(|node| node.class_name.clone())
            .collect()
    }

    /// Check that every reference in the plan points at a node that exists.
    ///
    /// Out-of-range *target* slots are tolerated (the argument is simply not
    /// passed); out-of-range *output* slots are not, since the compiled node
    /// would return a value that was never produced.
    pub fn validate(&self) -> Result<()> {
        if self.execution_order.is_empty() {
            return Err(BundleError::InvalidPlan("execution order is empty".into()));
        }

        let mut seen = FxHashSet::default();
        for node in &self.execution_order {
            if !seen.insert(&node.id) {
                return Err(BundleError::InvalidPlan(format!("duplicate node id {}", node.id)));
            }
        }

        for link in &self.internal_links {
            for id in [&link.origin_id, &link.target_id] {
                if !seen.contains(id) {
                    return Err(BundleError::InvalidPlan(format!(
                        "link references unknown node {id}"
                    )));
                }
            }
        }

        for (name, input) in &self.io_map.inputs {
            if !seen.contains(&input.target_node_id) {
                return Err(BundleError::InvalidPlan(format!(
                    "input '{name}' targets unknown node {}",
                    input.target_node_id
                )));
            }
        }

        for (name, output) in &self.io_map.outputs {
            let Some(node) = self.node(&output.origin_node_id) else {
                return Err(BundleError::InvalidPlan(format!(
                    "output '{name}' comes from unknown node {}",
                    output.origin_node_id
                )));
            };
            if output.origin_node_slot >= node.outputs.len() {
                return Err(BundleError::InvalidPlan(format!(
                    "output '{name}' uses slot {} of node {}, which has {} outputs",
                    output.origin_node_slot,
                    node.id,
                    node.outputs.len()
                )));
            }
        }
        Ok(())
    }
}
