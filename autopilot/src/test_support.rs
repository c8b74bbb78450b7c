//! Scripted collaborators and temp-project fixtures for tests.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use serde_json::Value;
use tempfile::TempDir;

use crate::core::message::{ChatMessage, ToolCall};
use crate::io::completion::CompletionClient;
use crate::io::confirm::Confirm;
use crate::io::forge::{IssueSummary, PullRequestDraft, SourceControl};
use crate::io::notify::NotificationChannel;
use crate::io::prompt::Prompt;
use crate::runtime::{RunFlags, Runtime};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct ClientScript {
    replies: VecDeque<Result<ChatMessage, String>>,
    requests: Vec<Vec<ChatMessage>>,
}

/// Completion client that replays queued replies and records every request.
///
/// Clones share the same script, so a test can keep a handle after moving the
/// client into a runtime.
#[derive(Clone, Default)]
pub struct ScriptedClient {
    script: Arc<Mutex<ClientScript>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<ChatMessage>) -> Self {
        let client = Self::default();
        for reply in replies {
            client.push_reply(reply);
        }
        client
    }

    pub fn push_reply(&self, reply: ChatMessage) {
        lock(&self.script).replies.push_back(Ok(reply));
    }

    pub fn push_error(&self, error: &str) {
        lock(&self.script).replies.push_back(Err(error.to_string()));
    }

    /// Conversations sent so far, one entry per `complete` call.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        lock(&self.script).requests.clone()
    }
}

impl CompletionClient for ScriptedClient {
    fn complete(&self, _model: &str, messages: &[ChatMessage], _tools: &[Value]) -> Result<ChatMessage> {
        let mut script = lock(&self.script);
        script.requests.push(messages.to_vec());
        match script.replies.pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(error)) => Err(anyhow!(error)),
            None => Err(anyhow!("scripted client has no replies left")),
        }
    }
}

/// Assistant turn requesting the given `(tool, arguments)` calls.
pub fn tool_call_reply(calls: &[(&str, &str)]) -> ChatMessage {
    ChatMessage::assistant_tool_calls(
        calls
            .iter()
            .enumerate()
            .map(|(i, (name, args))| ToolCall::new(format!("call_{i}"), *name, *args))
            .collect(),
    )
}

/// Notification channel that keeps every message it is sent.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingChannel {
    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }
}

impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    fn send(&self, message: &str) -> Result<()> {
        lock(&self.messages).push(message.to_string());
        Ok(())
    }
}

/// Confirmation prompt with a fixed answer that records which tools asked.
#[derive(Clone)]
pub struct ScriptedConfirm {
    answer: bool,
    asked: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConfirm {
    pub fn always(answer: bool) -> Self {
        Self {
            answer,
            asked: Arc::default(),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        lock(&self.asked).clone()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, tool: &str, _arguments: &Value) -> bool {
        lock(&self.asked).push(tool.to_string());
        self.answer
    }
}

#[derive(Default)]
struct ForgeState {
    issues: Vec<IssueSummary>,
    pulls: Vec<IssueSummary>,
    branches: Vec<(String, String)>,
    pull_requests: Vec<PullRequestDraft>,
}

/// In-memory forge. Created pull requests are numbered from 1.
#[derive(Default)]
pub struct FakeForge {
    state: Mutex<ForgeState>,
    failure: Option<String>,
}

fn summaries(items: Vec<(u64, String)>) -> Vec<IssueSummary> {
    items
        .into_iter()
        .map(|(number, title)| IssueSummary { number, title })
        .collect()
}

impl FakeForge {
    pub fn with_issues(issues: Vec<(u64, String)>) -> Self {
        let forge = Self::default();
        lock(&forge.state).issues = summaries(issues);
        forge
    }

    /// Forge whose every call fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn set_pulls(&self, pulls: Vec<(u64, String)>) {
        lock(&self.state).pulls = summaries(pulls);
    }

    /// `(branch, base)` pairs created so far.
    pub fn branches(&self) -> Vec<(String, String)> {
        lock(&self.state).branches.clone()
    }

    pub fn pull_requests(&self) -> Vec<PullRequestDraft> {
        lock(&self.state).pull_requests.clone()
    }

    fn check(&self) -> Result<()> {
        match &self.failure {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }
}

impl SourceControl for FakeForge {
    fn open_issues(&self) -> Result<Vec<IssueSummary>> {
        self.check()?;
        Ok(lock(&self.state).issues.clone())
    }

    fn open_pull_requests(&self) -> Result<Vec<IssueSummary>> {
        self.check()?;
        Ok(lock(&self.state).pulls.clone())
    }

    fn create_branch(&self, name: &str, base: &str) -> Result<()> {
        self.check()?;
        lock(&self.state).branches.push((name.to_string(), base.to_string()));
        Ok(())
    }

    fn create_pull_request(&self, draft: &PullRequestDraft) -> Result<IssueSummary> {
        self.check()?;
        let mut state = lock(&self.state);
        state.pull_requests.push(draft.clone());
        Ok(IssueSummary {
            number: state.pull_requests.len() as u64,
            title: draft.title.clone(),
        })
    }
}

/// Temporary project directory with an optional roadmap.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn roadmap_path(&self) -> PathBuf {
        self.dir.path().join("ROADMAP.md")
    }

    pub fn write_roadmap(&self, contents: &str) -> Result<()> {
        fs::write(self.roadmap_path(), contents)?;
        Ok(())
    }

    /// Runtime rooted at this project: one system prompt turn, auto-approving
    /// confirmation, no tools.
    pub fn runtime(&self, client: ScriptedClient, flags: RunFlags) -> Runtime {
        let prompt = Prompt {
            model: Some("test-model".to_string()),
            messages: vec![ChatMessage::system("You are a test assistant.")],
        };
        Runtime::new(prompt, Box::new(client))
            .with_flags(flags)
            .with_confirm(Box::new(ScriptedConfirm::always(true)))
            .with_roadmap(self.roadmap_path())
    }
}
