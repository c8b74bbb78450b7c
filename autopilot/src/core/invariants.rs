//! Workflow checks not expressible via JSON Schema.

use serde_json::Value;

use crate::core::binding::{BINDING_PREFIX, binding_key};
use crate::core::condition::BranchMode;
use crate::core::value::as_count;
use crate::core::workflow::{NodeKind, Workflow};

/// Check a parsed workflow against the set of registered node types:
/// - every plugin type resolves to a registered plugin
/// - loops have a body and a usable literal `max_iterations`
/// - branches use a known literal mode and have at least one arm
/// - output mappings name non-empty store keys
pub fn validate_workflow(workflow: &Workflow, is_registered: &dyn Fn(&str) -> bool) -> Vec<String> {
    let mut errors = Vec::new();
    workflow.walk(&mut |path, node| {
        match node.kind() {
            NodeKind::Plugin(node_type) => {
                if !is_registered(node_type) {
                    errors.push(format!("{path}: unknown node type '{node_type}'"));
                }
            }
            NodeKind::Loop => {
                if node.body.is_empty() {
                    errors.push(format!("{path}: loop has an empty body"));
                }
                if let Some(raw) = node.loop_setting("max_iterations")
                    && binding_key(raw).is_none()
                    && as_count(raw).is_none()
                {
                    errors.push(format!("{path}: max_iterations must be a non-negative integer, got {raw}"));
                }
            }
            NodeKind::Branch => {
                if let Some(Value::String(mode)) = node.inputs.get("mode")
                    && !mode.starts_with(BINDING_PREFIX)
                    && mode.parse::<BranchMode>().is_err()
                {
                    errors.push(format!("{path}: unknown branch mode '{mode}'"));
                }
                if node.then_steps.is_empty() && node.else_steps.is_empty() && node.output_key.is_none() {
                    errors.push(format!("{path}: branch has no steps and no output_key"));
                }
            }
        }

        if let Some(outputs) = &node.outputs {
            for (result_key, store_key) in outputs {
                if store_key.trim().is_empty() {
                    errors.push(format!("{path}: output '{result_key}' maps to an empty store key"));
                }
            }
        }
    });
    errors
}
