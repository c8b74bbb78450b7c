//! Interactive confirmation before running a tool.

use std::io::{BufRead, Write};

use serde_json::Value;
use tracing::warn;

pub trait Confirm {
    /// Whether the tool call may run.
    fn confirm(&self, tool: &str, arguments: &Value) -> bool;
}

/// Prompts on stderr and reads `y`/`yes` from stdin. Anything else declines.
#[derive(Debug, Default)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, tool: &str, arguments: &Value) -> bool {
        let mut stderr = std::io::stderr();
        if let Err(err) = write!(stderr, "Run tool {tool} with {arguments}? [y/N] ").and_then(|()| stderr.flush()) {
            warn!(err = %err, "failed to write confirmation prompt");
        }
        let mut answer = String::new();
        if let Err(err) = std::io::stdin().lock().read_line(&mut answer) {
            warn!(err = %err, "failed to read confirmation, declining");
            return false;
        }
        is_yes(&answer)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_yes_confirms() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("sure"));
    }
}
