//! Prompt file loading (`prompt.yml`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::message::ChatMessage;

const EMBEDDED_PROMPT: &str = include_str!("../../assets/prompt.yml");

/// Seed conversation and optional model override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl Prompt {
    pub fn parse(raw: &str) -> Result<Self> {
        let prompt: Prompt = serde_yaml::from_str(raw).context("parse prompt yaml")?;
        if prompt.messages.is_empty() {
            return Err(anyhow!("prompt must contain at least one message"));
        }
        Ok(prompt)
    }

    pub fn embedded() -> Result<Self> {
        Self::parse(EMBEDDED_PROMPT).context("embedded prompt")
    }
}

/// Load the prompt at `path`, or the embedded prompt when the file is missing.
pub fn load_prompt(path: &Path) -> Result<Prompt> {
    if !path.exists() {
        info!(path = %path.display(), "prompt file missing, using embedded prompt");
        return Prompt::embedded();
    }
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Prompt::parse(&raw).with_context(|| format!("load prompt {}", path.display()))
}
