//! Direct iteration driver: the default workflow's cycle without the interpreter.
//!
//! context -> seed -> (completion -> dispatch -> append)* until a stop condition.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::message::ChatMessage;
use crate::dispatcher::Dispatcher;
use crate::io::context::build_sdlc_context;
use crate::plugins::conversation::{
    announce_completion, context_turn, instruction_turn, request_completion, stop_if_mvp,
};
use crate::runtime::Runtime;

/// Why [`run_driver`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStop {
    /// The model answered without tool calls.
    Completed,
    /// `once` and the follow-up completion after the first tool round arrived.
    Once,
    /// `yolo` and the roadmap's MVP section is complete.
    MvpReached,
    /// The completion pass count reached `max_iterations`.
    MaxIterations,
}

#[derive(Debug, Clone)]
pub struct DriverOutcome {
    /// Completion requests made.
    pub passes: u32,
    pub stop: DriverStop,
    /// Final conversation.
    pub messages: Vec<ChatMessage>,
}

/// Run completion/tool rounds until a stop condition holds.
///
/// Stop checks after each completion, in order: no tool calls; `once` on the
/// second pass; after dispatching, MVP under `yolo`; the pass limit.
#[instrument(skip_all, fields(max_iterations = max_iterations, yolo = runtime.flags.yolo, once = runtime.flags.once))]
pub fn run_driver(runtime: &mut Runtime, max_iterations: u32) -> Result<DriverOutcome> {
    let context = build_sdlc_context(&runtime.roadmap_path, runtime.forge(), &runtime.texts)?;
    let mut messages = runtime.prompt.messages.clone();
    messages.push(context_turn(runtime, &context));
    messages.push(instruction_turn(runtime));

    let mut passes = 0u32;
    loop {
        let reply = request_completion(runtime, &messages)?;
        passes += 1;
        messages.push(reply.clone());

        if !reply.has_tool_calls() {
            announce_completion(runtime, &reply);
            return Ok(finish(passes, DriverStop::Completed, messages));
        }
        if runtime.flags.once && passes >= 2 {
            return Ok(finish(passes, DriverStop::Once, messages));
        }

        let results = Dispatcher::from_runtime(runtime).dispatch(&reply);
        messages.extend(results);

        if stop_if_mvp(runtime) {
            return Ok(finish(passes, DriverStop::MvpReached, messages));
        }
        if passes >= max_iterations {
            let max = max_iterations.to_string();
            warn!("{}", runtime.texts.format("max_iterations_reached", &[("max", max.as_str())]));
            return Ok(finish(passes, DriverStop::MaxIterations, messages));
        }
    }
}

fn finish(passes: u32, stop: DriverStop, messages: Vec<ChatMessage>) -> DriverOutcome {
    info!(passes, stop = ?stop, "driver stopped");
    DriverOutcome { passes, stop, messages }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Role;
    use crate::io::notify::Notifier;
    use crate::io::tool_catalog::ToolPolicy;
    use crate::runtime::RunFlags;
    use crate::test_support::{RecordingChannel, ScriptedClient, TestProject, tool_call_reply};
    use crate::tools::{ToolArgs, ToolMap};
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn yolo() -> RunFlags {
        RunFlags {
            yolo: true,
            ..RunFlags::default()
        }
    }

    fn tools() -> ToolMap {
        let mut tools = ToolMap::new();
        tools.insert(
            "list_files".into(),
            Arc::new(|_: &ToolArgs| -> anyhow::Result<Value> { Ok(json!(["src/lib.rs"])) }),
        );
        tools
    }

    #[test]
    fn plain_answer_completes_after_one_pass() {
        let project = TestProject::new().expect("project");
        let client = ScriptedClient::new(vec![ChatMessage::assistant("nothing to do")]);
        let mut runtime = project.runtime(client.clone(), yolo());
        let outcome = run_driver(&mut runtime, 5).expect("driver");
        assert_eq!(outcome.stop, DriverStop::Completed);
        assert_eq!(outcome.passes, 1);

        let first = &client.requests()[0];
        assert_eq!(first.len(), 3);
        assert_eq!(first[1].role, Role::System);
        assert!(first[1].text().starts_with("Current SDLC context:\n"));
        assert_eq!(first[2].text(), "What should be the next step?");
    }

    #[test]
    fn tool_results_feed_the_next_request() {
        let project = TestProject::new().expect("project");
        let client = ScriptedClient::new(vec![
            tool_call_reply(&[("list_files", "{}"), ("missing", "{}")]),
            ChatMessage::assistant("done"),
        ]);
        let mut runtime = project
            .runtime(client.clone(), yolo())
            .with_tools(tools(), Vec::new(), ToolPolicy::default());
        let outcome = run_driver(&mut runtime, 5).expect("driver");
        assert_eq!(outcome.stop, DriverStop::Completed);
        assert_eq!(outcome.passes, 2);

        let second = &client.requests()[1];
        let tail: Vec<&str> = second.iter().rev().take(2).map(ChatMessage::text).collect();
        assert_eq!(tail, vec!["Tool 'missing' not found.", r#"["src/lib.rs"]"#]);
    }

    #[test]
    fn once_stops_on_second_completion() {
        let project = TestProject::new().expect("project");
        let client = ScriptedClient::new(vec![
            tool_call_reply(&[("list_files", "{}")]),
            tool_call_reply(&[("list_files", "{}")]),
            tool_call_reply(&[("list_files", "{}")]),
        ]);
        let flags = RunFlags {
            once: true,
            ..yolo()
        };
        let mut runtime = project
            .runtime(client.clone(), flags)
            .with_tools(tools(), Vec::new(), ToolPolicy::default());
        let outcome = run_driver(&mut runtime, 10).expect("driver");
        assert_eq!(outcome.stop, DriverStop::Once);
        assert_eq!(client.requests().len(), 2);
    }

    #[test]
    fn max_iterations_bounds_the_run() {
        let project = TestProject::new().expect("project");
        let client = ScriptedClient::new((0..5).map(|_| tool_call_reply(&[("list_files", "{}")])).collect());
        let mut runtime = project
            .runtime(client.clone(), yolo())
            .with_tools(tools(), Vec::new(), ToolPolicy::default());
        let outcome = run_driver(&mut runtime, 3).expect("driver");
        assert_eq!(outcome.stop, DriverStop::MaxIterations);
        assert_eq!(outcome.passes, 3);
    }

    #[test]
    fn mvp_stops_yolo_run_with_one_notice() {
        let project = TestProject::new().expect("project");
        project.write_roadmap("## Launch (MVP)\n- [x] ship\n").expect("roadmap");
        let recorder = RecordingChannel::default();
        let client = ScriptedClient::new((0..5).map(|_| tool_call_reply(&[("list_files", "{}")])).collect());
        let mut runtime = project
            .runtime(client.clone(), yolo())
            .with_tools(tools(), Vec::new(), ToolPolicy::default())
            .with_notifier(Notifier::new(vec![Box::new(recorder.clone())]));
        let outcome = run_driver(&mut runtime, 10).expect("driver");
        assert_eq!(outcome.stop, DriverStop::MvpReached);
        assert_eq!(outcome.passes, 1);
        assert_eq!(recorder.messages(), vec!["Autopilot YOLO loop stopped: MVP reached.".to_string()]);
    }

    #[test]
    fn completion_errors_propagate() {
        let project = TestProject::new().expect("project");
        let client = ScriptedClient::default();
        client.push_error("quota exceeded");
        let mut runtime = project.runtime(client, yolo());
        let err = run_driver(&mut runtime, 3).expect_err("fails");
        assert!(format!("{err:#}").contains("quota exceeded"));
    }
}
