//! Project configuration stored in `autopilot.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::process::ProcessLimits;

pub const CONFIG_FILE: &str = "autopilot.toml";
pub const DEFAULT_ENDPOINT: &str = "https://models.github.ai/inference";
pub const DEFAULT_MODEL: &str = "openai/gpt-4.1";

/// Autopilot configuration (TOML).
///
/// Relative paths are resolved against the project root. Missing fields
/// default to values that work for a repository with a `ROADMAP.md` and
/// no customizations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutopilotConfig {
    /// Model used when the prompt file does not name one.
    pub model: String,

    /// OpenAI-compatible inference endpoint (`GITHUB_MODELS_ENDPOINT` overrides).
    pub endpoint: String,

    /// Hard cap on completion passes per run.
    pub max_iterations: u32,

    pub roadmap_path: PathBuf,
    pub prompt_path: PathBuf,

    /// Workflow document; the embedded default workflow is used when unset.
    pub workflow_path: Option<PathBuf>,
    /// Node type -> builtin implementation map; embedded default when unset.
    pub plugin_map_path: Option<PathBuf>,
    /// Directory scanned for command tool manifests (`*.json`).
    pub plugins_dir: PathBuf,
    /// Message catalog merged over the embedded English messages.
    pub messages_path: Option<PathBuf>,
    /// Tool name -> provider entries; embedded default when unset.
    pub tool_registry_path: Option<PathBuf>,
    /// Tool specs sent to the model; embedded default when unset.
    pub tool_specs_path: Option<PathBuf>,
    /// Overrides the embedded list of repository-modifying tools.
    pub modifying_tools: Option<Vec<String>>,

    pub tool_timeout_secs: u64,
    pub tool_output_limit_bytes: usize,

    pub retry: RetryConfig,
    pub commands: CommandsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandsConfig {
    /// Command behind the `run_tests` tool (e.g. `["cargo","test"]`).
    pub test: Vec<String>,
    /// Command behind the `run_lint` tool.
    pub lint: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 10_000,
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            test: vec!["cargo".to_string(), "test".to_string()],
            lint: vec![
                "cargo".to_string(),
                "clippy".to_string(),
                "--all-targets".to_string(),
            ],
        }
    }
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_iterations: 10,
            roadmap_path: PathBuf::from("ROADMAP.md"),
            prompt_path: PathBuf::from("prompt.yml"),
            workflow_path: None,
            plugin_map_path: None,
            plugins_dir: PathBuf::from("plugins"),
            messages_path: None,
            tool_registry_path: None,
            tool_specs_path: None,
            modifying_tools: None,
            tool_timeout_secs: 10 * 60,
            tool_output_limit_bytes: 100_000,
            retry: RetryConfig::default(),
            commands: CommandsConfig::default(),
        }
    }
}

impl AutopilotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must be non-empty"));
        }
        if self.endpoint.trim().is_empty() {
            return Err(anyhow!("endpoint must be non-empty"));
        }
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.tool_timeout_secs == 0 {
            return Err(anyhow!("tool_timeout_secs must be > 0"));
        }
        if self.tool_output_limit_bytes == 0 {
            return Err(anyhow!("tool_output_limit_bytes must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be > 0"));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(anyhow!("retry.max_backoff_ms must be >= retry.initial_backoff_ms"));
        }
        for (name, command) in [("commands.test", &self.commands.test), ("commands.lint", &self.commands.lint)] {
            if command.is_empty() || command[0].trim().is_empty() {
                return Err(anyhow!("{name} must be a non-empty array"));
            }
        }
        Ok(())
    }

    pub fn process_limits(&self) -> ProcessLimits {
        ProcessLimits {
            timeout: Duration::from_secs(self.tool_timeout_secs),
            output_limit_bytes: self.tool_output_limit_bytes,
        }
    }
}

/// Resolve a configured path against the project root.
pub fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AutopilotConfig::default()`.
pub fn load_config(path: &Path) -> Result<AutopilotConfig> {
    let cfg = if path.exists() {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?
    } else {
        AutopilotConfig::default()
    };
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AutopilotConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
