//! List, boolean and roadmap helpers (`utils.*`).

use anyhow::Result;
use serde_json::{Value, json};

use crate::core::binding::Inputs;
use crate::core::condition::{BranchMode, FilterMode, ItemMatcher};
use crate::core::value::{coerce_bool, display_value, ensure_list, normalize_separator};
use crate::io::roadmap::{is_mvp_reached, write_roadmap};
use crate::plugins::input_str;
use crate::runtime::Runtime;

const ITEM_PLACEHOLDER: &str = "{item}";

fn items(inputs: &Inputs) -> Vec<Value> {
    ensure_list(inputs.get("items").unwrap_or(&Value::Null))
}

pub fn filter_list(_runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    let mode = match input_str(inputs, "mode") {
        Some(mode) => mode.parse()?,
        None => FilterMode::default(),
    };
    let pattern = display_value(inputs.get("pattern").unwrap_or(&Value::Null));
    let matcher = ItemMatcher::new(mode, &pattern)?;
    let kept: Vec<Value> = items(inputs).into_iter().filter(|item| matcher.matches(item)).collect();
    Ok(json!({ "items": kept }))
}

/// Render `template` once per item, substituting `{item}`.
pub fn map_list(_runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    let template = input_str(inputs, "template").unwrap_or(ITEM_PLACEHOLDER);
    let mapped: Vec<Value> = items(inputs)
        .iter()
        .map(|item| Value::String(template.replace(ITEM_PLACEHOLDER, &display_value(item))))
        .collect();
    Ok(json!({ "items": mapped }))
}

pub fn reduce_list(_runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    let separator = normalize_separator(inputs.get("separator"));
    let joined = items(inputs)
        .iter()
        .map(display_value)
        .collect::<Vec<_>>()
        .join(&separator);
    Ok(json!({ "result": joined }))
}

pub fn not(_runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    Ok(json!({ "result": !coerce_bool(inputs.get("value").unwrap_or(&Value::Null)) }))
}

/// True when any input value coerces to true. No inputs is false.
pub fn any(_runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    Ok(json!({ "result": inputs.values().any(coerce_bool) }))
}

pub fn branch_condition(_runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    let mode = match input_str(inputs, "mode") {
        Some(mode) => mode.parse()?,
        None => BranchMode::default(),
    };
    let compare = display_value(inputs.get("compare").unwrap_or(&Value::Null));
    let result = mode.evaluate(inputs.get("value").unwrap_or(&Value::Null), &compare)?;
    Ok(json!({ "result": result }))
}

pub fn check_mvp(runtime: &mut Runtime, _inputs: &Inputs) -> Result<Value> {
    Ok(json!({ "mvp_reached": is_mvp_reached(&runtime.roadmap_path) }))
}

pub fn update_roadmap(runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    let Some(content) = input_str(inputs, "content") else {
        return Ok(json!({ "error": runtime.texts.get("roadmap_content_required") }));
    };
    write_roadmap(&runtime.roadmap_path, content)?;
    Ok(json!({ "result": format!("{} updated successfully", runtime.roadmap_path.display()) }))
}
