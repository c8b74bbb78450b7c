//! Executes the tool calls of an assistant turn.
//!
//! Every tool call yields exactly one tool-result turn, in call order, whatever
//! happens to the call. Nothing here retries.

use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::core::message::{ChatMessage, ToolCall};
use crate::io::confirm::Confirm;
use crate::io::tool_catalog::ToolPolicy;
use crate::io::translations::Translations;
use crate::runtime::{RunFlags, Runtime};
use crate::tools::{ToolArgs, ToolMap};

/// Array results are cut to this many items before reaching the model.
pub const LIST_PREVIEW_ITEMS: usize = 5;

/// What happened to one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    NotFound,
    InvalidArguments(String),
    DeclinedByUser,
    SkippedDryRun,
    Succeeded(String),
    Failed(String),
}

impl CallOutcome {
    /// Content of the tool-result turn.
    pub fn content(&self, tool: &str, texts: &Translations) -> String {
        match self {
            CallOutcome::NotFound => texts.format("tool_not_found", &[("name", tool)]),
            CallOutcome::InvalidArguments(error) => {
                texts.format("tool_invalid_arguments", &[("name", tool), ("error", error.as_str())])
            }
            CallOutcome::DeclinedByUser => texts.format("tool_skipped_by_user", &[("name", tool)]),
            CallOutcome::SkippedDryRun => texts.format("tool_skipped_dry_run", &[("name", tool)]),
            CallOutcome::Succeeded(output) => output.clone(),
            CallOutcome::Failed(error) => texts.format("tool_error", &[("name", tool), ("error", error.as_str())]),
        }
    }
}

/// Borrowed view of the runtime pieces the dispatcher needs.
pub struct Dispatcher<'a> {
    pub tools: &'a ToolMap,
    pub policy: &'a ToolPolicy,
    pub flags: RunFlags,
    pub confirm: &'a dyn Confirm,
    pub texts: &'a Translations,
}

impl<'a> Dispatcher<'a> {
    pub fn from_runtime(runtime: &'a Runtime) -> Self {
        Self {
            tools: &runtime.tools,
            policy: &runtime.policy,
            flags: runtime.flags,
            confirm: runtime.confirm.as_ref(),
            texts: &runtime.texts,
        }
    }

    /// One tool-result turn per tool call of `message`, in order.
    #[instrument(skip_all, fields(calls = message.tool_calls.len()))]
    pub fn dispatch(&self, message: &ChatMessage) -> Vec<ChatMessage> {
        message
            .tool_calls
            .iter()
            .map(|call| {
                let outcome = self.run_call(call);
                let name = call.function.name.as_str();
                ChatMessage::tool_result(call.id.clone(), name, outcome.content(name, self.texts))
            })
            .collect()
    }

    pub fn run_call(&self, call: &ToolCall) -> CallOutcome {
        let name = call.function.name.as_str();
        let outcome = self.gate_and_invoke(name, &call.function.arguments);
        match &outcome {
            CallOutcome::NotFound => warn!(tool = name, "tool not found"),
            CallOutcome::InvalidArguments(error) => warn!(tool = name, error = %error, "invalid tool arguments"),
            CallOutcome::DeclinedByUser => info!(tool = name, "tool skipped by user"),
            CallOutcome::SkippedDryRun => info!(tool = name, "tool skipped due to dry-run"),
            CallOutcome::Succeeded(output) => info!(tool = name, bytes = output.len(), "tool succeeded"),
            CallOutcome::Failed(error) => warn!(tool = name, error = %error, "tool failed"),
        }
        outcome
    }

    fn gate_and_invoke(&self, name: &str, raw_arguments: &str) -> CallOutcome {
        let Some(tool) = self.tools.get(name) else {
            return CallOutcome::NotFound;
        };
        let args = match parse_arguments(raw_arguments) {
            Ok(args) => args,
            Err(error) => return CallOutcome::InvalidArguments(error),
        };
        if !self.flags.yolo && !self.confirm.confirm(name, &Value::Object(args.clone())) {
            return CallOutcome::DeclinedByUser;
        }
        if self.flags.dry_run && self.policy.is_modifying(name) {
            return CallOutcome::SkippedDryRun;
        }
        match catch_unwind(AssertUnwindSafe(|| tool.call(&args))) {
            Ok(Ok(value)) => CallOutcome::Succeeded(render_output(name, &value, self.texts)),
            Ok(Err(err)) => CallOutcome::Failed(format!("{err:#}")),
            Err(_) => CallOutcome::Failed("tool panicked".to_string()),
        }
    }
}

fn parse_arguments(raw: &str) -> Result<ToolArgs, String> {
    if raw.trim().is_empty() {
        return Ok(ToolArgs::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(args)) => Ok(args),
        Ok(other) => Err(format!("expected a JSON object, got {other}")),
        Err(err) => Err(err.to_string()),
    }
}

fn render_output(name: &str, value: &Value, texts: &Translations) -> String {
    match value {
        Value::Null => texts.format("tool_done", &[("name", name)]),
        Value::String(text) => text.clone(),
        Value::Array(items) => {
            let preview: Vec<&Value> = items.iter().take(LIST_PREVIEW_ITEMS).collect();
            serde_json::to_string(&preview).unwrap_or_default()
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedConfirm;
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        tools: ToolMap,
        policy: ToolPolicy,
        texts: Translations,
        confirm: ScriptedConfirm,
        writes: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new(confirm: bool) -> Self {
            let writes = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&writes);
            let mut tools = ToolMap::new();
            tools.insert(
                "write_file".into(),
                Arc::new(move |_: &ToolArgs| -> anyhow::Result<Value> {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!("written"))
                }),
            );
            tools.insert(
                "list_files".into(),
                Arc::new(|_: &ToolArgs| -> anyhow::Result<Value> { Ok(json!(["a", "b", "c", "d", "e", "f", "g"])) }),
            );
            tools.insert("explode".into(), Arc::new(|_: &ToolArgs| -> anyhow::Result<Value> { Err(anyhow!("disk full")) }));
            tools.insert("noop".into(), Arc::new(|_: &ToolArgs| -> anyhow::Result<Value> { Ok(Value::Null) }));
            Self {
                tools,
                policy: ToolPolicy::new(["write_file"]),
                texts: Translations::default(),
                confirm: ScriptedConfirm::always(confirm),
                writes,
            }
        }

        fn dispatcher(&self, flags: RunFlags) -> Dispatcher<'_> {
            Dispatcher {
                tools: &self.tools,
                policy: &self.policy,
                flags,
                confirm: &self.confirm,
                texts: &self.texts,
            }
        }
    }

    fn yolo() -> RunFlags {
        RunFlags {
            yolo: true,
            ..RunFlags::default()
        }
    }

    fn turn(calls: &[(&str, &str)]) -> ChatMessage {
        ChatMessage::assistant_tool_calls(
            calls
                .iter()
                .enumerate()
                .map(|(i, (name, args))| ToolCall::new(format!("call_{i}"), *name, *args))
                .collect(),
        )
    }

    #[test]
    fn one_result_per_call_in_order() {
        let fixture = Fixture::new(true);
        let results = fixture
            .dispatcher(yolo())
            .dispatch(&turn(&[("noop", ""), ("missing_tool", "{}"), ("write_file", "{}")]));
        let ids: Vec<_> = results.iter().map(|m| m.tool_call_id.clone().unwrap_or_default()).collect();
        assert_eq!(ids, vec!["call_0", "call_1", "call_2"]);
        assert_eq!(results[0].text(), "Tool 'noop' completed.");
        assert_eq!(results[1].text(), "Tool 'missing_tool' not found.");
        assert_eq!(results[2].text(), "written");
    }

    #[test]
    fn dry_run_never_invokes_modifying_tools() {
        let fixture = Fixture::new(true);
        let flags = RunFlags {
            dry_run: true,
            ..yolo()
        };
        let results = fixture.dispatcher(flags).dispatch(&turn(&[("write_file", r#"{"path": "a"}"#)]));
        assert!(results[0].text().contains("skipped due to dry-run"));
        assert_eq!(fixture.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn declined_confirmation_skips_tool() {
        let fixture = Fixture::new(false);
        let results = fixture.dispatcher(RunFlags::default()).dispatch(&turn(&[("write_file", "{}")]));
        assert_eq!(results[0].text(), "Tool 'write_file' skipped by user.");
        assert_eq!(fixture.writes.load(Ordering::SeqCst), 0);
        assert_eq!(fixture.confirm.asked(), vec!["write_file".to_string()]);
    }

    #[test]
    fn yolo_never_asks() {
        let fixture = Fixture::new(false);
        let results = fixture.dispatcher(yolo()).dispatch(&turn(&[("write_file", "{}")]));
        assert_eq!(results[0].text(), "written");
        assert!(fixture.confirm.asked().is_empty());
    }

    #[test]
    fn errors_and_bad_arguments_become_results() {
        let fixture = Fixture::new(true);
        let results = fixture
            .dispatcher(yolo())
            .dispatch(&turn(&[("explode", "{}"), ("noop", "[1]"), ("noop", "{oops")]));
        assert_eq!(results[0].text(), "Error executing explode: disk full");
        assert!(results[1].text().contains("expected a JSON object"));
        assert!(results[2].text().starts_with("Error: invalid arguments for tool 'noop'"));
    }

    #[test]
    fn list_results_are_previewed() {
        let fixture = Fixture::new(true);
        let results = fixture.dispatcher(yolo()).dispatch(&turn(&[("list_files", "{}")]));
        assert_eq!(results[0].text(), r#"["a","b","c","d","e"]"#);
    }

    #[test]
    fn panicking_tool_is_contained() {
        let mut fixture = Fixture::new(true);
        fixture
            .tools
            .insert("boom".into(), Arc::new(|_: &ToolArgs| -> anyhow::Result<Value> { panic!("bad state") }));
        let results = fixture.dispatcher(yolo()).dispatch(&turn(&[("boom", "{}"), ("noop", "{}")]));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text(), "Error executing boom: tool panicked");
    }
}
