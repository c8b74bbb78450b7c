//! Command tools declared by JSON manifests in the plugins directory.
//!
//! ```json
//! {
//!   "tool": {"type": "function", "function": {"name": "count_todos", "parameters": {...}}},
//!   "command": ["sh", "-c", "grep -rc TODO src"],
//!   "modifying": false
//! }
//! ```
//!
//! The command receives the call arguments as JSON on stdin; its stdout is the
//! tool result. A non-zero exit is a tool error.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info};

use crate::io::process::{ProcessLimits, run_command_with_timeout};
use crate::io::tool_catalog::spec_name;
use crate::tools::{Tool, ToolArgs};

#[derive(Debug, Deserialize)]
struct Manifest {
    tool: Value,
    command: Vec<String>,
    #[serde(default)]
    modifying: bool,
}

/// A tool loaded from a manifest, with the spec to advertise to the model.
pub struct ManifestTool {
    pub name: String,
    pub spec: Value,
    pub modifying: bool,
    pub tool: Arc<dyn Tool>,
}

struct ManifestCommand {
    name: String,
    argv: Vec<String>,
    root: PathBuf,
    limits: ProcessLimits,
}

impl Tool for ManifestCommand {
    fn call(&self, args: &ToolArgs) -> Result<Value> {
        let (program, rest) = self
            .argv
            .split_first()
            .ok_or_else(|| anyhow!("{} has an empty command", self.name))?;
        let mut cmd = Command::new(program);
        cmd.args(rest).current_dir(&self.root);
        let input = serde_json::to_vec(args).context("encode tool arguments")?;
        let output = run_command_with_timeout(cmd, Some(&input), self.limits)?;
        if !output.success() {
            return Err(anyhow!("{} failed: {}", self.name, output.render()));
        }
        Ok(Value::String(String::from_utf8_lossy(&output.stdout).into_owned()))
    }
}

/// Load every `*.json` manifest in `dir`, in file-name order.
///
/// A missing directory yields no tools. Unreadable or malformed manifests are
/// logged and skipped.
pub fn scan_plugins_dir(dir: &Path, root: &Path, limits: ProcessLimits) -> Vec<ManifestTool> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut tools = Vec::new();
    for path in paths {
        match load_manifest(&path, root, limits) {
            Ok(tool) => {
                info!(tool = %tool.name, path = %path.display(), "loaded plugin tool");
                tools.push(tool);
            }
            Err(err) => {
                error!(path = %path.display(), err = %format!("{err:#}"), "failed to load plugin tool");
            }
        }
    }
    tools
}

fn load_manifest(path: &Path, root: &Path, limits: ProcessLimits) -> Result<ManifestTool> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let manifest: Manifest =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    let name = spec_name(&manifest.tool)
        .ok_or_else(|| anyhow!("manifest tool spec has no function.name"))?
        .to_string();
    if manifest.command.is_empty() {
        return Err(anyhow!("manifest command must be a non-empty array"));
    }
    Ok(ManifestTool {
        tool: Arc::new(ManifestCommand {
            name: name.clone(),
            argv: manifest.command,
            root: root.to_path_buf(),
            limits,
        }),
        name,
        spec: manifest.tool,
        modifying: manifest.modifying,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_manifest(dir: &Path, file: &str, manifest: Value) {
        fs::write(dir.join(file), serde_json::to_string(&manifest).expect("encode")).expect("write");
    }

    #[test]
    fn loads_valid_manifests_and_skips_broken_ones() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plugins = temp.path().join("plugins");
        fs::create_dir_all(&plugins).expect("mkdir");
        write_manifest(
            &plugins,
            "a_echo.json",
            json!({
                "tool": {"type": "function", "function": {"name": "echo_args"}},
                "command": ["cat"],
                "modifying": true
            }),
        );
        write_manifest(&plugins, "b_nameless.json", json!({"tool": {}, "command": ["true"]}));
        fs::write(plugins.join("c_broken.json"), "{not json").expect("write");
        fs::write(plugins.join("notes.txt"), "ignored").expect("write");

        let tools = scan_plugins_dir(&plugins, temp.path(), ProcessLimits::default());
        assert_eq!(tools.len(), 1);
        let loaded = &tools[0];
        assert_eq!(loaded.name, "echo_args");
        assert!(loaded.modifying);

        let args: ToolArgs = serde_json::from_value(json!({"q": 1})).expect("args");
        assert_eq!(loaded.tool.call(&args).expect("call"), json!("{\"q\":1}"));
    }

    #[test]
    fn failing_command_is_a_tool_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_manifest(
            temp.path(),
            "fail.json",
            json!({
                "tool": {"type": "function", "function": {"name": "fail"}},
                "command": ["sh", "-c", "echo nope >&2; exit 2"]
            }),
        );
        let tools = scan_plugins_dir(temp.path(), temp.path(), ProcessLimits::default());
        let err = tools[0].tool.call(&ToolArgs::new()).expect_err("fails");
        assert!(err.to_string().contains("exit code 2"));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn missing_directory_has_no_tools() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(scan_plugins_dir(&temp.path().join("nope"), temp.path(), ProcessLimits::default()).is_empty());
    }
}
