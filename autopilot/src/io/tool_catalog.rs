//! Tool specs, tool registry entries and the tool policy.
//!
//! Each of the three files has an embedded default; a configured path
//! replaces it entirely.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const EMBEDDED_SPECS: &str = include_str!("../../assets/tools.json");
const EMBEDDED_REGISTRY: &str = include_str!("../../assets/tool_registry.json");
const EMBEDDED_POLICY: &str = include_str!("../../assets/tool_policies.json");

/// Which collaborator implements a model-visible tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolProvider {
    /// Implemented in-process (files, commands).
    Builtin,
    /// Implemented by the source-control forge.
    Forge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolEntry {
    pub name: String,
    pub provider: ToolProvider,
    /// Implementation name when it differs from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callable: Option<String>,
}

impl ToolEntry {
    pub fn implementation(&self) -> &str {
        self.callable.as_deref().unwrap_or(&self.name)
    }
}

/// Tools that change the repository and are skipped under `--dry-run`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPolicy {
    #[serde(default)]
    pub modifying_tools: BTreeSet<String>,
}

impl ToolPolicy {
    pub fn new<I, S>(modifying: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            modifying_tools: modifying.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_modifying(&self, tool: &str) -> bool {
        self.modifying_tools.contains(tool)
    }
}

fn load_or_embedded<T: DeserializeOwned>(path: Option<&Path>, embedded: &str, what: &str) -> Result<T> {
    match path {
        Some(path) => {
            let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parse {what} {}", path.display()))
        }
        None => serde_json::from_str(embedded).with_context(|| format!("parse embedded {what}")),
    }
}

/// Tool specs in the OpenAI `tools` shape (`{"type":"function","function":{...}}`).
pub fn load_tool_specs(path: Option<&Path>) -> Result<Vec<Value>> {
    let specs: Vec<Value> = load_or_embedded(path, EMBEDDED_SPECS, "tool specs")?;
    for (index, spec) in specs.iter().enumerate() {
        if spec_name(spec).is_none() {
            return Err(anyhow!("tool spec {index} has no function.name"));
        }
    }
    Ok(specs)
}

pub fn load_tool_registry(path: Option<&Path>) -> Result<Vec<ToolEntry>> {
    load_or_embedded(path, EMBEDDED_REGISTRY, "tool registry")
}

pub fn load_tool_policy(path: Option<&Path>) -> Result<ToolPolicy> {
    load_or_embedded(path, EMBEDDED_POLICY, "tool policy")
}

/// Function name declared by a tool spec.
pub fn spec_name(spec: &Value) -> Option<&str> {
    spec.pointer("/function/name").and_then(Value::as_str)
}
