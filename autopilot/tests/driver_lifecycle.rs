//! Run lifecycle: supervised driver passes and CLI exit codes.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};

use autopilot::core::message::ChatMessage;
use autopilot::driver::{DriverStop, run_driver};
use autopilot::exit_codes;
use autopilot::io::prompt::Prompt;
use autopilot::io::tool_catalog::ToolPolicy;
use autopilot::runtime::{RunFlags, Runtime};
use autopilot::supervisor::{RunMode, RunRequest, RunSupervisor};
use autopilot::test_support::{ScriptedClient, TestProject, tool_call_reply};
use autopilot::tools::{ToolArgs, ToolMap};
use serde_json::{Value, json};

#[test]
fn supervised_iterations_stop_once_mvp_is_reached() {
    let project = TestProject::new().expect("project");
    project.write_roadmap("## Launch (MVP)\n- [ ] ship\n").expect("roadmap");
    let roadmap = project.roadmap_path();

    // The second pass's tool call completes the MVP section.
    let mut tools = ToolMap::new();
    let target = roadmap.clone();
    tools.insert(
        "finish_mvp".into(),
        Arc::new(move |_: &ToolArgs| -> anyhow::Result<Value> {
            fs::write(&target, "## Launch (MVP)\n- [x] ship\n")?;
            Ok(Value::Null)
        }),
    );
    let client = ScriptedClient::new(vec![
        ChatMessage::assistant("pass one done"),
        tool_call_reply(&[("finish_mvp", "{}")]),
        ChatMessage::assistant("never requested"),
    ]);
    let stops = Arc::new(Mutex::new(Vec::new()));

    let runtime_client = client.clone();
    let seen = Arc::clone(&stops);
    let job_tools = tools.clone();
    let job_roadmap = roadmap.clone();
    let supervisor = RunSupervisor::new();
    let request = RunRequest {
        mode: RunMode::Iterations(4),
        yolo: true,
        stop_at_mvp: true,
        roadmap_path: roadmap.clone(),
    };
    let handle = supervisor
        .start(request, move |request| {
            let flags = RunFlags {
                yolo: request.yolo,
                ..RunFlags::default()
            };
            let prompt = Prompt {
                model: Some("m".to_string()),
                messages: vec![ChatMessage::system("sys")],
            };
            let mut runtime = Runtime::new(prompt, Box::new(runtime_client.clone()))
                .with_flags(flags)
                .with_roadmap(job_roadmap.clone())
                .with_tools(job_tools.clone(), Vec::new(), ToolPolicy::default());
            let outcome = run_driver(&mut runtime, 5)?;
            seen.lock().expect("lock").push(outcome.stop);
            Ok(())
        })
        .expect("start");
    handle.join().expect("join");

    assert_eq!(
        *stops.lock().expect("lock"),
        vec![DriverStop::Completed, DriverStop::MvpReached]
    );
    assert_eq!(client.requests().len(), 2);
    assert!(!supervisor.is_running());
}

fn autopilot(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_autopilot"))
        .current_dir(dir)
        .args(args)
        .env_remove("GITHUB_TOKEN")
        .env_remove("GITHUB_REPOSITORY")
        .env("RUST_LOG", "off")
        .output()
        .expect("run autopilot")
}

#[test]
fn validate_accepts_the_default_workflow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = autopilot(temp.path(), &["validate"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("ok: sdlc-loop"));
}

#[test]
fn validate_rejects_unknown_node_types() {
    let temp = tempfile::tempdir().expect("tempdir");
    let workflow = json!({"nodes": [{"type": "utils.not"}, {"type": "custom.deploy"}]});
    fs::write(temp.path().join("flow.json"), workflow.to_string()).expect("write");
    let output = autopilot(temp.path(), &["validate", "--workflow", "flow.json"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown node type 'custom.deploy'"));
}

#[test]
fn run_without_token_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = autopilot(temp.path(), &["run", "--once"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn plugins_lists_builtin_node_types() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = autopilot(temp.path(), &["plugins"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let listed = String::from_utf8_lossy(&output.stdout);
    assert!(listed.lines().any(|line| line == "core.ai_request"));
    assert!(listed.lines().any(|line| line == "notifications.all"));
}
