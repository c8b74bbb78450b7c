//! Workflow document loading with schema validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;

use crate::core::workflow::{MissingNodesError, Workflow};

const WORKFLOW_SCHEMA: &str = include_str!("../../assets/workflow.schema.json");
const DEFAULT_WORKFLOW: &str = include_str!("../../assets/default_workflow.json");

/// Read the workflow document at `path`, or the embedded default workflow.
pub fn read_workflow_document(path: Option<&Path>) -> Result<Value> {
    match path {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("read workflow {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("parse workflow {}", path.display()))
        }
        None => serde_json::from_str(DEFAULT_WORKFLOW).context("parse embedded workflow"),
    }
}

/// Load and validate a workflow (node list present, then schema).
pub fn load_workflow(path: Option<&Path>) -> Result<Workflow> {
    let document = read_workflow_document(path)?;
    if !document.get("nodes").is_some_and(Value::is_array) {
        return Err(MissingNodesError.into());
    }
    validate_schema(&document)?;
    Workflow::from_value(&document)
}

pub fn validate_schema(document: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(WORKFLOW_SCHEMA).context("parse workflow schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(document) {
        let messages = compiled
            .iter_errors(document)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "workflow schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
