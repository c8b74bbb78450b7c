//! Node type -> plugin table.
//!
//! Built once at startup and immutable while a workflow runs. The declarative
//! plugin map names builtin implementations from [`crate::plugins::catalog`];
//! names that do not resolve are logged and left out.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::core::binding::Inputs;
use crate::plugins;
use crate::runtime::Runtime;

/// A workflow node handler: `(runtime, resolved inputs) -> outputs`.
pub type Plugin = Arc<dyn Fn(&mut Runtime, &Inputs) -> Result<Value> + Send + Sync>;

const EMBEDDED_PLUGIN_MAP: &str = include_str!("../assets/plugin_map.json");

#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Plugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every builtin under its canonical name.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (name, plugin) in plugins::catalog() {
            registry.register(name, plugin);
        }
        registry
    }

    /// Registry for a `{node_type: implementation}` map.
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        let catalog: BTreeMap<&str, plugins::PluginFn> = plugins::catalog().into_iter().collect();
        let mut registry = Self::new();
        for (node_type, implementation) in map {
            match catalog.get(implementation.as_str()) {
                Some(plugin) => registry.register(node_type, *plugin),
                None => error!(
                    node_type = %node_type,
                    implementation = %implementation,
                    "unknown plugin implementation, node type unavailable"
                ),
            }
        }
        debug!(registered = registry.len(), "plugin registry built");
        registry
    }

    pub fn register<F>(&mut self, node_type: impl Into<String>, plugin: F)
    where
        F: Fn(&mut Runtime, &Inputs) -> Result<Value> + Send + Sync + 'static,
    {
        self.plugins.insert(node_type.into(), Arc::new(plugin));
    }

    pub fn get(&self, node_type: &str) -> Option<&Plugin> {
        self.plugins.get(node_type)
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.plugins.contains_key(node_type)
    }

    pub fn node_types(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Read the plugin map at `path`, or the embedded map when `path` is `None`
/// or names a file that does not exist.
///
/// A map file that exists but cannot be read or parsed is logged and treated
/// as empty.
pub fn load_plugin_map(path: Option<&Path>) -> BTreeMap<String, String> {
    let parsed = match path {
        Some(path) => match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "plugin map not found, using embedded map");
                embedded_plugin_map()
            }
            Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
        },
        None => embedded_plugin_map(),
    };
    match parsed {
        Ok(map) => map,
        Err(err) => {
            error!(err = %format!("{err:#}"), "failed to load plugin map");
            BTreeMap::new()
        }
    }
}

fn embedded_plugin_map() -> Result<BTreeMap<String, String>> {
    serde_json::from_str(EMBEDDED_PLUGIN_MAP).context("parse embedded plugin map")
}

/// Plugin results are objects; anything else is wrapped as `{"result": value}`.
pub fn normalize_outputs(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    }
}
