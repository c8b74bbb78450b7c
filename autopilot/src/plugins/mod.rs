//! Builtin workflow plugins.
//!
//! Each plugin takes the runtime and its resolved inputs and returns an output
//! object. The catalog below is the only place builtin names are bound to code;
//! the plugin map refers to entries by these names.

pub mod conversation;
pub mod notify;
pub mod tools;
pub mod utils;
pub mod vars;

use anyhow::Result;
use serde_json::Value;

use crate::core::binding::Inputs;
use crate::runtime::Runtime;

pub type PluginFn = fn(&mut Runtime, &Inputs) -> Result<Value>;

/// Every builtin plugin under its canonical name.
pub fn catalog() -> Vec<(&'static str, PluginFn)> {
    vec![
        ("core.seed_messages", conversation::seed_messages as PluginFn),
        ("core.load_context", conversation::load_context),
        ("core.append_context_message", conversation::append_context_message),
        ("core.append_user_instruction", conversation::append_user_instruction),
        ("core.ai_request", conversation::ai_request),
        ("core.run_tool_calls", conversation::run_tool_calls),
        ("core.append_tool_results", conversation::append_tool_results),
        ("utils.filter_list", utils::filter_list),
        ("utils.map_list", utils::map_list),
        ("utils.reduce_list", utils::reduce_list),
        ("utils.not", utils::not),
        ("utils.any", utils::any),
        ("utils.branch_condition", utils::branch_condition),
        ("utils.check_mvp", utils::check_mvp),
        ("utils.update_roadmap", utils::update_roadmap),
        ("var.get", vars::get),
        ("var.set", vars::set),
        ("var.delete", vars::delete),
        ("var.exists", vars::exists),
        ("tools.read_file", tools::read_file),
        ("tools.list_files", tools::list_files),
        ("tools.run_tests", tools::run_tests),
        ("tools.run_lint", tools::run_lint),
        ("tools.create_branch", tools::create_branch),
        ("tools.create_pull_request", tools::create_pull_request),
        ("notifications.all", notify::all),
    ]
}

/// String input, or `None` when absent, null or blank.
pub(crate) fn input_str<'a>(inputs: &'a Inputs, key: &str) -> Option<&'a str> {
    inputs
        .get(key)
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
}
