//! Workflow execution entry point: parse, check, then interpret.

use std::fmt;

use anyhow::Result;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::core::binding::Store;
use crate::core::invariants::validate_workflow;
use crate::core::workflow::{NodeKind, Workflow};
use crate::executor::{NodeExecutor, RunReport};
use crate::registry::PluginRegistry;
use crate::runtime::Runtime;

/// Node types in a workflow that no plugin handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownNodeTypeError {
    /// `(path, node type)` for every unresolved node.
    pub nodes: Vec<(String, String)>,
}

impl fmt::Display for UnknownNodeTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown node type(s):")?;
        for (path, node_type) in &self.nodes {
            write!(f, "\n- {path}: {node_type}")?;
        }
        Ok(())
    }
}

impl std::error::Error for UnknownNodeTypeError {}

pub struct WorkflowEngine {
    registry: PluginRegistry,
}

impl WorkflowEngine {
    pub fn new(registry: PluginRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Structural problems and unresolved node types, as messages.
    pub fn check(&self, workflow: &Workflow) -> Vec<String> {
        validate_workflow(workflow, &|node_type| self.registry.contains(node_type))
    }

    /// Fails with [`UnknownNodeTypeError`] when any node type is unresolved.
    pub fn ensure_resolvable(&self, workflow: &Workflow) -> Result<(), UnknownNodeTypeError> {
        let mut nodes = Vec::new();
        workflow.walk(&mut |path, node| {
            if let NodeKind::Plugin(node_type) = node.kind()
                && !self.registry.contains(node_type)
            {
                nodes.push((path.to_string(), node_type.to_string()));
            }
        });
        if nodes.is_empty() {
            Ok(())
        } else {
            Err(UnknownNodeTypeError { nodes })
        }
    }

    /// Parse `document` and run it with a fresh store.
    ///
    /// A document without a `nodes` list fails with
    /// [`crate::core::workflow::MissingNodesError`].
    pub fn execute(&self, document: &Value, runtime: &mut Runtime) -> Result<RunReport> {
        let workflow = Workflow::from_value(document)?;
        self.run(&workflow, runtime)
    }

    #[instrument(skip_all, fields(workflow = workflow.name.as_deref().unwrap_or("unnamed"), nodes = workflow.nodes.len()))]
    pub fn run(&self, workflow: &Workflow, runtime: &mut Runtime) -> Result<RunReport> {
        for issue in self.check(workflow) {
            warn!(issue = %issue, "workflow check");
        }
        runtime.store = Store::new();
        let mut executor = NodeExecutor::new(&self.registry);
        executor.execute_nodes(&workflow.nodes, runtime)?;
        let report = executor.into_report();
        info!(
            executed = report.executed,
            skipped = report.skipped,
            unresolved = report.unresolved.len(),
            loop_iterations = report.loop_iterations,
            "workflow finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::workflow::MissingNodesError;
    use crate::runtime::RunFlags;
    use crate::test_support::{ScriptedClient, TestProject};
    use serde_json::json;

    #[test]
    fn missing_nodes_is_a_typed_error() {
        let project = TestProject::new().expect("project");
        let mut runtime = project.runtime(ScriptedClient::default(), RunFlags::default());
        let engine = WorkflowEngine::new(PluginRegistry::builtin());
        let err = engine.execute(&json!({"name": "empty"}), &mut runtime).expect_err("fails");
        assert!(err.downcast_ref::<MissingNodesError>().is_some());
    }

    #[test]
    fn each_run_starts_with_a_fresh_store() {
        let project = TestProject::new().expect("project");
        let mut runtime = project.runtime(ScriptedClient::default(), RunFlags::default());
        runtime.store.insert("stale", json!(true));
        let engine = WorkflowEngine::new(PluginRegistry::builtin());
        let doc = json!({"nodes": [{"type": "var.set", "inputs": {"key": "k", "value": 1}, "outputs": {}}]});
        engine.execute(&doc, &mut runtime).expect("run");
        assert_eq!(runtime.store.to_value(), json!({"k": 1}));
    }

    #[test]
    fn unresolved_types_are_listed_with_paths() {
        let engine = WorkflowEngine::new(PluginRegistry::builtin());
        let workflow = Workflow::from_value(&json!({"nodes": [
            {"type": "utils.not"},
            {"type": "loop", "body": [{"type": "custom.thing"}]}
        ]}))
        .expect("workflow");
        let err = engine.ensure_resolvable(&workflow).expect_err("unresolved");
        assert_eq!(err.nodes, vec![("nodes[1].body[0]".to_string(), "custom.thing".to_string())]);
        assert!(engine.check(&workflow).iter().any(|issue| issue.contains("custom.thing")));
    }

    #[test]
    fn default_workflow_resolves_against_builtins() {
        let engine = WorkflowEngine::new(PluginRegistry::builtin());
        let workflow = crate::io::workflow_store::load_workflow(None).expect("default workflow");
        assert!(engine.ensure_resolvable(&workflow).is_ok());
        assert!(engine.check(&workflow).is_empty(), "{:?}", engine.check(&workflow));
    }
}
