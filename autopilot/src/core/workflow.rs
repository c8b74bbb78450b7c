//! Workflow definition types.
//!
//! A workflow is an ordered list of typed nodes. Two node types are built
//! into the interpreter (`loop` and `branch`, each also accepted with a
//! `control.` prefix); every other type names a registered plugin.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::binding::Inputs;

pub const LOOP_TYPES: [&str; 2] = ["loop", "control.loop"];
pub const BRANCH_TYPES: [&str; 2] = ["branch", "control.branch"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub nodes: Vec<NodeSpec>,
}

/// One node of a workflow.
///
/// Loop settings (`max_iterations`, `stop_when`, `stop_on`) may be given either
/// as top-level fields or inside `inputs`; `inputs` takes precedence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Inputs::is_empty")]
    pub inputs: Inputs,
    /// Result key -> store key. Absent means every result key is written under its own name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<NodeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_when: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_on: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub then_steps: Vec<NodeSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub else_steps: Vec<NodeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind<'a> {
    Loop,
    Branch,
    Plugin(&'a str),
}

impl NodeSpec {
    /// Plain plugin node with no inputs or outputs.
    pub fn plugin(node_type: impl Into<String>) -> Self {
        Self {
            id: None,
            node_type: node_type.into(),
            inputs: Inputs::new(),
            outputs: None,
            when: None,
            disabled: false,
            body: Vec::new(),
            max_iterations: None,
            stop_when: None,
            stop_on: None,
            then_steps: Vec::new(),
            else_steps: Vec::new(),
            output_key: None,
        }
    }

    pub fn kind(&self) -> NodeKind<'_> {
        let node_type = self.node_type.as_str();
        if LOOP_TYPES.contains(&node_type) {
            NodeKind::Loop
        } else if BRANCH_TYPES.contains(&node_type) {
            NodeKind::Branch
        } else {
            NodeKind::Plugin(node_type)
        }
    }

    /// Name used in logs: the id when present, otherwise the type.
    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.node_type)
    }

    pub fn loop_setting(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.inputs.get(name) {
            return Some(value);
        }
        match name {
            "max_iterations" => self.max_iterations.as_ref(),
            "stop_when" => self.stop_when.as_ref(),
            "stop_on" => self.stop_on.as_ref(),
            _ => None,
        }
    }
}

/// The workflow document has no `nodes` array. Fatal for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingNodesError;

impl fmt::Display for MissingNodesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("workflow definition is missing its `nodes` list")
    }
}

impl std::error::Error for MissingNodesError {}

impl Workflow {
    /// Parse a workflow document, failing with [`MissingNodesError`] when `nodes`
    /// is absent or not an array.
    pub fn from_value(document: &Value) -> Result<Self> {
        if !document.get("nodes").is_some_and(Value::is_array) {
            return Err(MissingNodesError.into());
        }
        serde_json::from_value(document.clone()).context("parse workflow definition")
    }

    /// Visit every node depth-first with its path (`nodes[0].body[1]`).
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&str, &'a NodeSpec)) {
        walk_list("nodes", &self.nodes, visit);
    }
}

fn walk_list<'a>(prefix: &str, nodes: &'a [NodeSpec], visit: &mut dyn FnMut(&str, &'a NodeSpec)) {
    for (index, node) in nodes.iter().enumerate() {
        let path = format!("{prefix}[{index}]");
        visit(&path, node);
        walk_list(&format!("{path}.body"), &node.body, visit);
        walk_list(&format!("{path}.then_steps"), &node.then_steps, visit);
        walk_list(&format!("{path}.else_steps"), &node.else_steps, visit);
    }
}
