//! Direct access to the shared store (`var.*`).

use anyhow::Result;
use serde_json::{Value, json};

use crate::core::binding::Inputs;
use crate::plugins::input_str;
use crate::runtime::Runtime;

pub fn get(runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    let default = inputs.get("default").cloned().unwrap_or(Value::Null);
    let stored = input_str(inputs, "key").and_then(|key| runtime.store.get(key));
    Ok(json!({
        "exists": stored.is_some(),
        "result": stored.cloned().unwrap_or(default),
    }))
}

pub fn set(runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    let Some(key) = input_str(inputs, "key") else {
        return Ok(json!({ "result": null, "error": runtime.texts.get("no_key_provided") }));
    };
    let value = inputs.get("value").cloned().unwrap_or(Value::Null);
    runtime.store.insert(key, value.clone());
    Ok(json!({ "result": value, "key": key }))
}

pub fn delete(runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    let deleted = input_str(inputs, "key").is_some_and(|key| runtime.store.remove(key).is_some());
    Ok(json!({ "result": deleted, "deleted": deleted }))
}

pub fn exists(runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    let exists = input_str(inputs, "key").is_some_and(|key| runtime.store.contains_key(key));
    Ok(json!({ "result": exists }))
}
