//! `notifications.all`: fan a message out to every configured channel.

use anyhow::Result;
use serde_json::{Value, json};
use tracing::debug;

use crate::core::binding::Inputs;
use crate::core::value::display_value;
use crate::runtime::Runtime;

pub fn all(runtime: &mut Runtime, inputs: &Inputs) -> Result<Value> {
    let message = display_value(inputs.get("message").unwrap_or(&Value::Null));
    if message.is_empty() {
        debug!("empty notification, nothing sent");
        return Ok(json!({ "sent": 0 }));
    }
    Ok(json!({ "sent": runtime.notifier.notify_all(&message) }))
}
