//! Conversation plugins (`core.*`): build the chat, ask the model, run tools.
//!
//! The step functions are public so the direct iteration driver walks the same
//! cycle as the default workflow.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::core::binding::Inputs;
use crate::core::message::{ChatMessage, message_from_value, messages_from_value, messages_to_value};
use crate::core::value::display_value;
use crate::dispatcher::Dispatcher;
use crate::io::context::build_sdlc_context;
use crate::io::roadmap::is_mvp_reached;
use crate::runtime::Runtime;

/// Characters of the final assistant text quoted in the completion notice.
const SUMMARY_CHARS: usize = 100;

fn input_messages(inputs: &Inputs) -> Result<Vec<ChatMessage>> {
    messages_from_value(inputs.get("messages").unwrap_or(&Value::Null))
}

pub fn context_turn(runtime: &Runtime, context: &str) -> ChatMessage {
    ChatMessage::system(format!("{}{context}", runtime.texts.get("sdlc_context_label")))
}

pub fn instruction_turn(runtime: &Runtime) -> ChatMessage {
    ChatMessage::user(runtime.texts.get("user_next_step"))
}

/// Request the next assistant turn for `messages`.
#[instrument(skip_all, fields(model = %runtime.model, messages = messages.len()))]
pub fn request_completion(runtime: &Runtime, messages: &[ChatMessage]) -> Result<ChatMessage> {
    let reply = runtime
        .client
        .complete(&runtime.model, messages, &runtime.tool_specs)
        .context("request completion")?;
    if reply.has_tool_calls() {
        info!(calls = reply.tool_calls.len(), "{}", runtime.texts.get("info_tool_call_requested"));
    }
    Ok(reply)
}

/// Best-effort "task complete" notice quoting the start of the final answer.
/// An empty answer sends nothing.
pub fn announce_completion(runtime: &Runtime, reply: &ChatMessage) {
    if reply.text().is_empty() {
        return;
    }
    let summary: String = reply.text().chars().take(SUMMARY_CHARS).collect();
    let notice = runtime.texts.format("task_complete_notice", &[("summary", summary.as_str())]);
    runtime.notifier.notify_all(&notice);
}

/// Under yolo, check the roadmap and send one notice when the MVP is reached.
pub fn stop_if_mvp(runtime: &Runtime) -> bool {
    if !runtime.flags.yolo || !is_mvp_reached(&runtime.roadmap_path) {
        return false;
    }
    info!("{}", runtime.texts.get("mvp_reached_log"));
    runtime.notifier.notify_all(runtime.texts.get("mvp_reached_notice"));
    true
}

pub fn seed_messages(runtime: &mut Runtime, _inputs: &Inputs) -> Result<Value> {
    Ok(json!({ "messages": messages_to_value(&runtime.prompt.messages)? }))
}

pub fn load_context(runtime: &mut Runtime, _inputs: &Inputs) -> Result<Value> {
    let context = build_sdlc_context(&runtime.roadmap_path, runtime.forge(), &runtime.texts)?;
    Ok(json!({ "context": context }))
}

pub fn append_context_message(runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    let mut messages = input_messages(inputs)?;
    let context = display_value(inputs.get("context").unwrap_or(&Value::Null));
    messages.push(context_turn(runtime, &context));
    Ok(json!({ "messages": messages_to_value(&messages)? }))
}

pub fn append_user_instruction(runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    let mut messages = input_messages(inputs)?;
    messages.push(instruction_turn(runtime));
    Ok(json!({ "messages": messages_to_value(&messages)? }))
}

pub fn ai_request(runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    let mut messages = input_messages(inputs)?;
    let reply = request_completion(runtime, &messages)?;
    let tool_calls_count = reply.tool_calls.len();
    let response = serde_json::to_value(&reply).context("encode assistant turn")?;
    messages.push(reply);
    Ok(json!({
        "response": response,
        "messages": messages_to_value(&messages)?,
        "has_tool_calls": tool_calls_count > 0,
        "tool_calls_count": tool_calls_count,
    }))
}

pub fn run_tool_calls(runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    let response = message_from_value(inputs.get("response").unwrap_or(&Value::Null))?;
    let response = match response {
        Some(reply) if reply.has_tool_calls() => reply,
        Some(reply) => {
            announce_completion(runtime, &reply);
            return Ok(json!({ "tool_results": [], "no_tool_calls": true }));
        }
        None => return Ok(json!({ "tool_results": [], "no_tool_calls": true })),
    };
    let results = Dispatcher::from_runtime(runtime).dispatch(&response);
    Ok(json!({
        "tool_results": messages_to_value(&results)?,
        "no_tool_calls": false,
    }))
}

pub fn append_tool_results(runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    let mut messages = input_messages(inputs)?;
    messages.extend(messages_from_value(inputs.get("tool_results").unwrap_or(&Value::Null))?);
    let mvp_reached = stop_if_mvp(runtime);
    Ok(json!({
        "messages": messages_to_value(&messages)?,
        "mvp_reached": mvp_reached,
    }))
}
