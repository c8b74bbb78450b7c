//! Tools the model can call.
//!
//! A tool receives the decoded JSON argument object of a tool call and
//! returns a string, a list, or `null`. Tools are looked up by name in a
//! [`ToolMap`] built from the tool registry entries.

pub mod commands;
pub mod files;
pub mod forge;
pub mod manifest;

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::io::config::CommandsConfig;
use crate::io::forge::SourceControl;
use crate::io::process::ProcessLimits;
use crate::io::tool_catalog::{ToolEntry, ToolProvider};

pub type ToolArgs = Map<String, Value>;

pub trait Tool: Send + Sync {
    fn call(&self, args: &ToolArgs) -> Result<Value>;
}

impl<F> Tool for F
where
    F: Fn(&ToolArgs) -> Result<Value> + Send + Sync,
{
    fn call(&self, args: &ToolArgs) -> Result<Value> {
        self(args)
    }
}

pub type ToolMap = BTreeMap<String, Arc<dyn Tool>>;

/// Where builtin tools operate and how their subprocesses are bounded.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub root: PathBuf,
    pub limits: ProcessLimits,
    pub commands: CommandsConfig,
}

impl ToolSettings {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            limits: ProcessLimits::default(),
            commands: CommandsConfig::default(),
        }
    }
}

/// Build the tool map for the registry entries.
///
/// Unknown builtin names are logged and skipped. Forge tools are only
/// available when a forge is configured.
pub fn build_tool_map(
    entries: &[ToolEntry],
    settings: &ToolSettings,
    forge: Option<&Arc<dyn SourceControl>>,
) -> ToolMap {
    let mut tools = ToolMap::new();
    for entry in entries {
        let implementation = entry.implementation();
        let tool = match entry.provider {
            ToolProvider::Builtin => builtin_tool(implementation, settings),
            ToolProvider::Forge => match forge {
                Some(forge) => self::forge::forge_tool(implementation, forge),
                None => {
                    debug!(tool = %entry.name, "no forge configured, tool unavailable");
                    continue;
                }
            },
        };
        match tool {
            Some(tool) => {
                tools.insert(entry.name.clone(), tool);
            }
            None => warn!(tool = %entry.name, implementation, "unknown tool implementation, skipping"),
        }
    }
    tools
}

fn builtin_tool(name: &str, settings: &ToolSettings) -> Option<Arc<dyn Tool>> {
    files::file_tool(name, &settings.root).or_else(|| commands::command_tool(name, settings))
}

pub(crate) fn arg_str<'a>(args: &'a ToolArgs, key: &str) -> Result<&'a str> {
    match args.get(key) {
        Some(Value::String(text)) => Ok(text),
        Some(other) => Err(anyhow!("argument '{key}' must be a string, got {other}")),
        None => Err(anyhow!("missing required argument '{key}'")),
    }
}

pub(crate) fn arg_str_or<'a>(args: &'a ToolArgs, key: &str, default: &'a str) -> Result<&'a str> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(_) => arg_str(args, key),
    }
}

/// Resolve a tool-supplied relative path inside `root`.
///
/// Absolute paths and `..` components are rejected so tools cannot reach
/// outside the repository.
pub(crate) fn path_in_root(root: &Path, relative: &str) -> Result<PathBuf> {
    let candidate = Path::new(relative);
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => bail!("path '{relative}' must stay inside the repository"),
        }
    }
    Ok(root.join(candidate))
}
