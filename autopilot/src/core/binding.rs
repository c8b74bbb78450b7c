//! Shared store and `$key` binding resolution.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Prefix that marks an input value as a reference into the store.
pub const BINDING_PREFIX: char = '$';

/// Resolved or raw node inputs.
pub type Inputs = Map<String, Value>;

/// Key/value store shared by every node of one workflow execution.
///
/// The store also remembers which node last wrote each key, so that an
/// implicit passthrough silently replacing another node's output can be
/// reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Store {
    values: BTreeMap<String, Value>,
    writers: BTreeMap<String, String>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Insert a value without attributing it to a node.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        self.writers.remove(&key);
        self.values.insert(key, value)
    }

    /// Insert a value on behalf of `writer`.
    ///
    /// Returns the previous writer when it was a different node.
    pub fn insert_from(&mut self, writer: &str, key: &str, value: Value) -> Option<String> {
        self.values.insert(key.to_string(), value);
        let previous = self
            .writers
            .insert(key.to_string(), writer.to_string());
        previous.filter(|prev| prev != writer)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.writers.remove(key);
        self.values.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Snapshot of the stored values as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

/// Store key referenced by `value`, if it is a binding.
pub fn binding_key(value: &Value) -> Option<&str> {
    match value {
        Value::String(text) => text.strip_prefix(BINDING_PREFIX),
        _ => None,
    }
}

/// Resolve a single value.
///
/// Bindings resolve to the stored value, or `None` when the key is unset.
/// Any other value resolves to itself.
pub fn resolve_binding(value: &Value, store: &Store) -> Option<Value> {
    match binding_key(value) {
        Some(key) => store.get(key).cloned(),
        None => Some(value.clone()),
    }
}

/// Resolve every top-level input value; unset bindings become `null`.
pub fn resolve_inputs(raw: &Inputs, store: &Store) -> Inputs {
    raw.iter()
        .map(|(name, value)| {
            let resolved = resolve_binding(value, store).unwrap_or(Value::Null);
            (name.clone(), resolved)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn literals_resolve_to_themselves() {
        let store = Store::new();
        for value in [json!("plain"), json!(3), json!(["$a"]), json!({"k": "$v"}), json!(null)] {
            assert_eq!(resolve_binding(&value, &store), Some(value.clone()));
        }
    }

    #[test]
    fn bindings_read_the_store() {
        let mut store = Store::new();
        store.insert("answer", json!(42));
        assert_eq!(resolve_binding(&json!("$answer"), &store), Some(json!(42)));
        assert_eq!(resolve_binding(&json!("$missing"), &store), None);
        assert_eq!(resolve_binding(&json!("$"), &store), None);
    }

    #[test]
    fn resolve_inputs_maps_unset_to_null() {
        let mut store = Store::new();
        store.insert("msgs", json!(["hi"]));
        let raw: Inputs = serde_json::from_value(json!({
            "messages": "$msgs",
            "missing": "$nope",
            "mode": "contains",
            "nested": ["$msgs"],
        }))
        .expect("inputs");
        let resolved = resolve_inputs(&raw, &store);
        assert_eq!(resolved["messages"], json!(["hi"]));
        assert_eq!(resolved["missing"], Value::Null);
        assert_eq!(resolved["mode"], json!("contains"));
        assert_eq!(resolved["nested"], json!(["$msgs"]));
    }

    #[test]
    fn insert_from_reports_other_writers() {
        let mut store = Store::new();
        assert_eq!(store.insert_from("a", "k", json!(1)), None);
        assert_eq!(store.insert_from("a", "k", json!(2)), None);
        assert_eq!(store.insert_from("b", "k", json!(3)), Some("a".to_string()));
        assert_eq!(store.get("k"), Some(&json!(3)));
    }
}
