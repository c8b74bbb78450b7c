//! Assemble a runtime from the project configuration and the environment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::io::completion::{OpenAiClient, RetryPolicy, RetryingClient};
use crate::io::config::{AutopilotConfig, CONFIG_FILE, load_config, resolve};
use crate::io::forge::{GitHubForge, SourceControl};
use crate::io::notify::Notifier;
use crate::io::prompt::load_prompt;
use crate::io::tool_catalog::{ToolPolicy, load_tool_policy, load_tool_registry, load_tool_specs, spec_name};
use crate::io::translations::load_translations;
use crate::io::workflow_store::{read_workflow_document, validate_schema};
use crate::registry::{PluginRegistry, load_plugin_map};
use crate::runtime::{RunFlags, Runtime};
use crate::tools::manifest::scan_plugins_dir;
use crate::tools::{ToolMap, ToolSettings, build_tool_map};

pub const TOKEN_VAR: &str = "GITHUB_TOKEN";
pub const REPOSITORY_VAR: &str = "GITHUB_REPOSITORY";
pub const ENDPOINT_VAR: &str = "GITHUB_MODELS_ENDPOINT";

/// Process environment lookup; blank values count as unset.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// A project root and its loaded configuration.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config: AutopilotConfig,
}

impl Project {
    /// Load `config_path` (default `<root>/autopilot.toml`). A missing file means defaults.
    pub fn load(root: &Path, config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => resolve(root, path),
            None => root.join(CONFIG_FILE),
        };
        let config = load_config(&config_path)?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    pub fn path(&self, relative: &Path) -> PathBuf {
        resolve(&self.root, relative)
    }

    fn optional_path(&self, relative: Option<&PathBuf>) -> Option<PathBuf> {
        relative.map(|path| self.path(path))
    }

    pub fn roadmap_path(&self) -> PathBuf {
        self.path(&self.config.roadmap_path)
    }

    /// Plugin registry from the configured (or embedded) plugin map.
    pub fn registry(&self) -> PluginRegistry {
        let map_path = self.optional_path(self.config.plugin_map_path.as_ref());
        PluginRegistry::from_map(&load_plugin_map(map_path.as_deref()))
    }

    /// Workflow document from `override_path`, the config, or the embedded default,
    /// validated against the workflow schema.
    pub fn workflow_document(&self, override_path: Option<&Path>) -> Result<Value> {
        let path = match override_path {
            Some(path) => Some(self.path(path)),
            None => self.optional_path(self.config.workflow_path.as_ref()),
        };
        let document = read_workflow_document(path.as_deref())?;
        if document.get("nodes").is_some() {
            validate_schema(&document)?;
        }
        Ok(document)
    }

    /// Tool map, advertised specs and policy: registry entries plus manifest tools.
    pub fn tools(&self, forge: Option<&Arc<dyn SourceControl>>) -> Result<(ToolMap, Vec<Value>, ToolPolicy)> {
        let entries = load_tool_registry(self.optional_path(self.config.tool_registry_path.as_ref()).as_deref())?;
        let mut specs = load_tool_specs(self.optional_path(self.config.tool_specs_path.as_ref()).as_deref())?;
        let mut policy = match &self.config.modifying_tools {
            Some(names) => ToolPolicy::new(names.iter().cloned()),
            None => load_tool_policy(None)?,
        };

        let settings = ToolSettings {
            root: self.root.clone(),
            limits: self.config.process_limits(),
            commands: self.config.commands.clone(),
        };
        let mut tools = build_tool_map(&entries, &settings, forge);
        for manifest in scan_plugins_dir(&self.path(&self.config.plugins_dir), &self.root, settings.limits) {
            if tools.contains_key(&manifest.name) {
                warn!(tool = %manifest.name, "plugin tool shadows a registered tool");
            }
            if manifest.modifying {
                policy.modifying_tools.insert(manifest.name.clone());
            }
            specs.retain(|spec| spec_name(spec) != Some(manifest.name.as_str()));
            specs.push(manifest.spec);
            tools.insert(manifest.name, manifest.tool);
        }
        Ok((tools, specs, policy))
    }

    /// Runtime for a run: prompt, completion client, tools, forge, notifications.
    ///
    /// `GITHUB_TOKEN` is required. Without `GITHUB_REPOSITORY`, or when the forge
    /// cannot be built, the run continues without forge data or forge tools.
    #[instrument(skip_all, fields(root = %self.root.display()))]
    pub fn build_runtime(&self, flags: RunFlags, env: &dyn Fn(&str) -> Option<String>) -> Result<Runtime> {
        let token = env(TOKEN_VAR).ok_or_else(|| anyhow!("{TOKEN_VAR} is not set"))?;
        let endpoint = env(ENDPOINT_VAR).unwrap_or_else(|| self.config.endpoint.clone());

        let mut prompt = load_prompt(&self.path(&self.config.prompt_path))?;
        if prompt.model.is_none() {
            prompt.model = Some(self.config.model.clone());
        }
        let client = RetryingClient::new(
            OpenAiClient::new(&endpoint, &token)?,
            RetryPolicy::from_config(&self.config.retry),
        );

        let forge = match env(REPOSITORY_VAR) {
            Some(repo) => match GitHubForge::new(&repo, &token) {
                Ok(forge) => {
                    info!(repo = %repo, "forge configured");
                    Some(Arc::new(forge) as Arc<dyn SourceControl>)
                }
                Err(err) => {
                    warn!(err = %format!("{err:#}"), "forge unavailable, continuing without it");
                    None
                }
            },
            None => {
                warn!("{REPOSITORY_VAR} not set, continuing without forge");
                None
            }
        };

        let (tools, specs, policy) = self.tools(forge.as_ref())?;
        let texts = load_translations(self.optional_path(self.config.messages_path.as_ref()).as_deref())
            .context("load messages")?;
        info!(tools = tools.len(), specs = specs.len(), "runtime assembled");

        let mut runtime = Runtime::new(prompt, Box::new(client))
            .with_flags(flags)
            .with_tools(tools, specs, policy)
            .with_texts(texts)
            .with_notifier(Notifier::from_env(env))
            .with_roadmap(self.roadmap_path());
        if let Some(forge) = forge {
            runtime = runtime.with_forge(forge);
        }
        Ok(runtime)
    }
}
