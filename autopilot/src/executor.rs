//! Depth-first workflow interpreter.
//!
//! Walks a node list against the runtime's shared store. Plain nodes call their
//! plugin and write outputs; `loop` and `branch` nodes nest further node lists.
//! Plugin errors abort the remaining nodes.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, error, instrument, warn};

use crate::core::binding::{resolve_binding, resolve_inputs};
use crate::core::condition::BranchMode;
use crate::core::value::{as_count, coerce_bool, display_value};
use crate::core::workflow::{NodeKind, NodeSpec};
use crate::registry::{PluginRegistry, normalize_outputs};
use crate::runtime::Runtime;

/// Iterations a loop runs when `max_iterations` is absent or invalid.
pub const DEFAULT_LOOP_ITERATIONS: u64 = 1;

/// Counters for one workflow execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Nodes whose plugin ran, plus loop and branch nodes entered.
    pub executed: usize,
    /// Nodes skipped by `disabled` or a false `when`.
    pub skipped: usize,
    /// Node types with no registered plugin, once per occurrence.
    pub unresolved: Vec<String>,
    /// Loop body passes across all loop nodes.
    pub loop_iterations: u64,
    /// Loops that hit `max_iterations` before their stop condition fired.
    pub exhausted_loops: usize,
}

pub struct NodeExecutor<'r> {
    registry: &'r PluginRegistry,
    report: RunReport,
}

impl<'r> NodeExecutor<'r> {
    pub fn new(registry: &'r PluginRegistry) -> Self {
        Self {
            registry,
            report: RunReport::default(),
        }
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn into_report(self) -> RunReport {
        self.report
    }

    pub fn execute_nodes(&mut self, nodes: &[NodeSpec], runtime: &mut Runtime) -> Result<()> {
        for node in nodes {
            self.execute_node(node, runtime)?;
        }
        Ok(())
    }

    fn execute_node(&mut self, node: &NodeSpec, runtime: &mut Runtime) -> Result<()> {
        if node.disabled {
            debug!(node = node.label(), "node disabled, skipping");
            self.report.skipped += 1;
            return Ok(());
        }
        if let Some(when) = &node.when
            && !resolve_binding(when, &runtime.store).is_some_and(|value| coerce_bool(&value))
        {
            debug!(node = node.label(), "when condition false, skipping");
            self.report.skipped += 1;
            return Ok(());
        }
        match node.kind() {
            NodeKind::Loop => self.execute_loop(node, runtime),
            NodeKind::Branch => self.execute_branch(node, runtime),
            NodeKind::Plugin(node_type) => self.execute_plugin(node, node_type, runtime),
        }
    }

    fn execute_plugin(&mut self, node: &NodeSpec, node_type: &str, runtime: &mut Runtime) -> Result<()> {
        let registry = self.registry;
        let Some(plugin) = registry.get(node_type) else {
            error!(node = node.label(), node_type, "no plugin registered for node type, skipping");
            self.report.unresolved.push(node_type.to_string());
            return Ok(());
        };
        let inputs = resolve_inputs(&node.inputs, &runtime.store);
        debug!(node = node.label(), node_type, "executing node");
        let result = plugin(runtime, &inputs)
            .with_context(|| format!("node '{}' ({node_type}) failed", node.label()))?;
        self.report.executed += 1;
        write_outputs(node, normalize_outputs(result), runtime);
        Ok(())
    }

    #[instrument(skip_all, fields(node = node.label()))]
    fn execute_loop(&mut self, node: &NodeSpec, runtime: &mut Runtime) -> Result<()> {
        self.report.executed += 1;
        let mut max_iterations = loop_limit(node, runtime);
        if runtime.flags.once {
            max_iterations = max_iterations.min(1);
        }
        let stop_when = node.loop_setting("stop_when");
        let stop_on = node
            .loop_setting("stop_on")
            .map_or(true, |raw| coerce_bool(&resolve_binding(raw, &runtime.store).unwrap_or(Value::Null)));

        for iteration in 1..=max_iterations {
            debug!(iteration, max_iterations, "loop iteration");
            self.report.loop_iterations += 1;
            self.execute_nodes(&node.body, runtime)?;
            if let Some(stop_when) = stop_when {
                let current = resolve_binding(stop_when, &runtime.store).unwrap_or(Value::Null);
                if coerce_bool(&current) == stop_on {
                    debug!(iteration, "loop stop condition met");
                    return Ok(());
                }
            }
        }
        if stop_when.is_some() && max_iterations > 0 && !runtime.flags.once {
            self.report.exhausted_loops += 1;
            let max = max_iterations.to_string();
            warn!(max_iterations, "{}", runtime.texts.format("max_iterations_reached", &[("max", max.as_str())]));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(node = node.label()))]
    fn execute_branch(&mut self, node: &NodeSpec, runtime: &mut Runtime) -> Result<()> {
        self.report.executed += 1;
        let inputs = resolve_inputs(&node.inputs, &runtime.store);
        let mode = match inputs.get("mode").map(display_value).filter(|mode| !mode.is_empty()) {
            Some(mode) => mode
                .parse::<BranchMode>()
                .with_context(|| format!("branch node '{}'", node.label()))?,
            None => BranchMode::default(),
        };
        let compare = inputs.get("compare").map(display_value).unwrap_or_default();
        let value = inputs.get("value").unwrap_or(&Value::Null);
        let taken = mode
            .evaluate(value, &compare)
            .with_context(|| format!("branch node '{}'", node.label()))?;
        debug!(mode = %mode, taken, "branch evaluated");

        if let Some(key) = &node.output_key {
            runtime.store.insert_from(node.label(), key, Value::Bool(taken));
        }
        let steps = if taken { &node.then_steps } else { &node.else_steps };
        self.execute_nodes(steps, runtime)
    }
}

fn loop_limit(node: &NodeSpec, runtime: &Runtime) -> u64 {
    let Some(raw) = node.loop_setting("max_iterations") else {
        return DEFAULT_LOOP_ITERATIONS;
    };
    let resolved = resolve_binding(raw, &runtime.store).unwrap_or(Value::Null);
    as_count(&resolved).unwrap_or_else(|| {
        warn!(value = %resolved, default = DEFAULT_LOOP_ITERATIONS, "invalid max_iterations, using default");
        DEFAULT_LOOP_ITERATIONS
    })
}

/// Write a plugin result into the store.
///
/// With an `outputs` mapping only the declared keys are written (missing result
/// keys as `null`); without one every result key is written under its own name.
fn write_outputs(node: &NodeSpec, result: Map<String, Value>, runtime: &mut Runtime) {
    let writer = node.label();
    match &node.outputs {
        Some(mapping) => {
            for (result_key, store_key) in mapping {
                let value = result.get(result_key).cloned().unwrap_or(Value::Null);
                runtime.store.insert_from(writer, store_key, value);
            }
        }
        None => {
            for (key, value) in result {
                if let Some(previous) = runtime.store.insert_from(writer, &key, value) {
                    warn!(node = writer, key = %key, previous = %previous, "passthrough output overwrote another node's key");
                }
            }
        }
    }
}
