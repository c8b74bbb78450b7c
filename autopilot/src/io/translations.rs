//! User-facing message catalog.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

const EMBEDDED_MESSAGES: &str = include_str!("../../assets/messages_en.json");

/// Message templates keyed by id. Templates use `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translations {
    entries: BTreeMap<String, String>,
}

impl Default for Translations {
    fn default() -> Self {
        Self {
            entries: serde_json::from_str(EMBEDDED_MESSAGES).unwrap_or_default(),
        }
    }
}

impl Translations {
    /// Template for `key`, or the key itself when the catalog has no entry.
    pub fn get<'a>(&'a self, key: &'a str) -> &'a str {
        self.entries.get(key).map_or(key, String::as_str)
    }

    /// Template for `key` with each `{name}` placeholder substituted.
    pub fn format(&self, key: &str, args: &[(&str, &str)]) -> String {
        args.iter()
            .fold(self.get(key).to_string(), |text, (name, value)| {
                text.replace(&format!("{{{name}}}"), value)
            })
    }

    pub fn merge(&mut self, overrides: BTreeMap<String, String>) {
        self.entries.extend(overrides);
    }
}

/// Embedded English messages, overridden by the entries of `path` when given.
pub fn load_translations(path: Option<&Path>) -> Result<Translations> {
    let mut translations = Translations::default();
    if let Some(path) = path {
        let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let overrides: BTreeMap<String, String> =
            serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
        translations.merge(overrides);
    }
    Ok(translations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_catalog_parses() {
        let parsed: BTreeMap<String, String> =
            serde_json::from_str(EMBEDDED_MESSAGES).expect("embedded messages");
        assert!(parsed.contains_key("user_next_step"));
        assert_eq!(Translations::default().get("tool_error"), parsed["tool_error"]);
    }

    #[test]
    fn format_substitutes_placeholders() {
        let t = Translations::default();
        assert_eq!(
            t.format("tool_error", &[("name", "ls"), ("error", "boom")]),
            "Error executing ls: boom"
        );
        assert_eq!(t.get("no.such.key"), "no.such.key");
    }

    #[test]
    fn overrides_merge_over_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("messages.json");
        fs::write(&path, r#"{"user_next_step": "Next?"}"#).expect("write");
        let t = load_translations(Some(&path)).expect("load");
        assert_eq!(t.get("user_next_step"), "Next?");
        assert_eq!(t.get("roadmap_label"), "ROADMAP.md Content:");
    }
}
