//! Workflow access to the tool map (`tools.*`).
//!
//! Node inputs are the tool arguments. Calls go through
//! [`Runtime::call_tool`], so dry-run still holds.

use anyhow::Result;
use serde_json::{Value, json};

use crate::core::binding::Inputs;
use crate::runtime::Runtime;

fn call(runtime: &Runtime, tool: &str, inputs: &Inputs) -> Result<Value> {
    Ok(json!({ "result": runtime.call_tool(tool, inputs)? }))
}

pub fn read_file(runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    call(runtime, "read_file", inputs)
}

pub fn list_files(runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    call(runtime, "list_files", inputs)
}

pub fn run_tests(runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    call(runtime, "run_tests", inputs)
}

pub fn run_lint(runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    call(runtime, "run_lint", inputs)
}

pub fn create_branch(runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    call(runtime, "create_branch", inputs)
}

pub fn create_pull_request(runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    call(runtime, "create_pull_request", inputs)
}
