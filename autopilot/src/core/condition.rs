//! Branch conditions and list-filter predicates.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde_json::Value;

use crate::core::value::{display_value, ensure_list, is_truthy};

/// How a branch node tests its `value` input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchMode {
    IsEmpty,
    #[default]
    IsTruthy,
    Equals,
    NotEquals,
    Contains,
    Regex,
}

impl BranchMode {
    pub const ALL: [BranchMode; 6] = [
        BranchMode::IsEmpty,
        BranchMode::IsTruthy,
        BranchMode::Equals,
        BranchMode::NotEquals,
        BranchMode::Contains,
        BranchMode::Regex,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BranchMode::IsEmpty => "is_empty",
            BranchMode::IsTruthy => "is_truthy",
            BranchMode::Equals => "equals",
            BranchMode::NotEquals => "not_equals",
            BranchMode::Contains => "contains",
            BranchMode::Regex => "regex",
        }
    }

    /// Evaluate the condition. `compare` is ignored by the emptiness/truthiness modes.
    pub fn evaluate(self, value: &Value, compare: &str) -> Result<bool> {
        let text = || display_value(value);
        Ok(match self {
            BranchMode::IsEmpty => ensure_list(value).is_empty(),
            BranchMode::IsTruthy => is_truthy(value),
            BranchMode::Equals => text() == compare,
            BranchMode::NotEquals => text() != compare,
            BranchMode::Contains => text().contains(compare),
            BranchMode::Regex => compile(compare)?.is_match(&text()),
        })
    }
}

impl FromStr for BranchMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        BranchMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == raw)
            .ok_or_else(|| anyhow!("unknown branch mode '{raw}'"))
    }
}

impl fmt::Display for BranchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How `utils.filter_list` matches items against its pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    #[default]
    Contains,
    Regex,
    Equals,
    NotEquals,
    StartsWith,
    EndsWith,
}

impl FromStr for FilterMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "contains" => Ok(FilterMode::Contains),
            "regex" => Ok(FilterMode::Regex),
            "equals" => Ok(FilterMode::Equals),
            "not_equals" => Ok(FilterMode::NotEquals),
            "starts_with" => Ok(FilterMode::StartsWith),
            "ends_with" => Ok(FilterMode::EndsWith),
            other => Err(anyhow!("unknown filter mode '{other}'")),
        }
    }
}

/// Compiled predicate over the display text of list items.
pub struct ItemMatcher {
    mode: FilterMode,
    pattern: String,
    regex: Option<Regex>,
}

impl ItemMatcher {
    pub fn new(mode: FilterMode, pattern: &str) -> Result<Self> {
        let regex = match mode {
            FilterMode::Regex => Some(compile(pattern)?),
            _ => None,
        };
        Ok(Self {
            mode,
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, item: &Value) -> bool {
        let text = display_value(item);
        match self.mode {
            FilterMode::Contains => text.contains(&self.pattern),
            FilterMode::Regex => self.regex.as_ref().is_some_and(|re| re.is_match(&text)),
            FilterMode::Equals => text == self.pattern,
            FilterMode::NotEquals => text != self.pattern,
            FilterMode::StartsWith => text.starts_with(&self.pattern),
            FilterMode::EndsWith => text.ends_with(&self.pattern),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).with_context(|| format!("invalid regex '{pattern}'"))
}
