//! Per-execution runtime: collaborators, flags and the shared store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::info;

use crate::core::binding::Store;
use crate::io::completion::CompletionClient;
use crate::io::confirm::{Confirm, StdinConfirm};
use crate::io::forge::SourceControl;
use crate::io::notify::Notifier;
use crate::io::prompt::Prompt;
use crate::io::tool_catalog::ToolPolicy;
use crate::io::translations::Translations;
use crate::tools::{ToolArgs, ToolMap};

/// Run-wide switches from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFlags {
    /// Never invoke tools that modify the repository.
    pub dry_run: bool,
    /// Run tools without asking for confirmation.
    pub yolo: bool,
    /// Cap the run at a single iteration.
    pub once: bool,
}

/// Everything one workflow execution needs. Owned by exactly one execution.
pub struct Runtime {
    pub store: Store,
    pub flags: RunFlags,
    pub model: String,
    pub prompt: Prompt,
    pub client: Box<dyn CompletionClient>,
    pub tools: ToolMap,
    /// Tool specs advertised to the model.
    pub tool_specs: Vec<Value>,
    pub policy: ToolPolicy,
    pub texts: Translations,
    pub forge: Option<Arc<dyn SourceControl>>,
    pub notifier: Notifier,
    pub confirm: Box<dyn Confirm>,
    pub roadmap_path: PathBuf,
}

impl Runtime {
    /// Runtime with no tools, no forge and no notification channels.
    pub fn new(prompt: Prompt, client: Box<dyn CompletionClient>) -> Self {
        let model = prompt
            .model
            .clone()
            .unwrap_or_else(|| crate::io::config::DEFAULT_MODEL.to_string());
        Self {
            store: Store::new(),
            flags: RunFlags::default(),
            model,
            prompt,
            client,
            tools: ToolMap::new(),
            tool_specs: Vec::new(),
            policy: ToolPolicy::default(),
            texts: Translations::default(),
            forge: None,
            notifier: Notifier::default(),
            confirm: Box::new(StdinConfirm),
            roadmap_path: PathBuf::from("ROADMAP.md"),
        }
    }

    pub fn with_flags(mut self, flags: RunFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_tools(mut self, tools: ToolMap, specs: Vec<Value>, policy: ToolPolicy) -> Self {
        self.tools = tools;
        self.tool_specs = specs;
        self.policy = policy;
        self
    }

    pub fn with_forge(mut self, forge: Arc<dyn SourceControl>) -> Self {
        self.forge = Some(forge);
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_confirm(mut self, confirm: Box<dyn Confirm>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_roadmap(mut self, path: impl Into<PathBuf>) -> Self {
        self.roadmap_path = path.into();
        self
    }

    pub fn with_texts(mut self, texts: Translations) -> Self {
        self.texts = texts;
        self
    }

    pub fn forge(&self) -> Option<&dyn SourceControl> {
        self.forge.as_deref()
    }

    /// Call a tool directly from a workflow node.
    ///
    /// Unknown tools and modifying tools under dry-run return the same
    /// messages the dispatcher would hand to the model.
    pub fn call_tool(&self, name: &str, args: &ToolArgs) -> Result<Value> {
        let Some(tool) = self.tools.get(name) else {
            return Ok(Value::String(self.texts.format("tool_not_found", &[("name", name)])));
        };
        if self.flags.dry_run && self.policy.is_modifying(name) {
            info!(tool = name, "skipped due to dry-run");
            return Ok(Value::String(self.texts.format("tool_skipped_dry_run", &[("name", name)])));
        }
        tool.call(args)
    }
}
