//! Loose value coercions used by workflow plugins.
//!
//! Workflow inputs arrive as JSON literals or as whatever an upstream node
//! wrote into the store, so plugins normalize them through these helpers
//! instead of assuming a shape.

use serde_json::Value;

/// Normalize a value into a list.
///
/// - `null` becomes an empty list
/// - arrays pass through unchanged
/// - strings are split into their non-blank lines
/// - anything else becomes a single-element list
pub fn ensure_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        Value::String(text) => text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Value::String(line.to_string()))
            .collect(),
        other => vec![other.clone()],
    }
}

/// Coerce a value to a boolean.
///
/// Strings are trimmed and matched case-insensitively against
/// `true|yes|1` and `false|no|0|""`. Unrecognized strings and every
/// other value fall back to [`is_truthy`].
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => true,
            "false" | "no" | "0" | "" => false,
            _ => is_truthy(value),
        },
        other => is_truthy(other),
    }
}

/// Truthiness: `null`, `false`, zero, and empty strings/arrays/objects are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Turn a separator input into the literal string to join with.
///
/// Escaped `\n` and `\t` sequences (as typed into a JSON workflow) become
/// real newline and tab characters.
pub fn normalize_separator(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.replace("\\n", "\n").replace("\\t", "\t"),
        Some(other) => other.to_string(),
    }
}

/// Render a value the way it reads in a message: strings unquoted, `null` empty.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Interpret a value as a non-negative count (numbers or numeric strings).
pub fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|n| *n >= 0.0 && n.fract() == 0.0).map(|n| n as u64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ensure_list_normalizes_shapes() {
        assert_eq!(ensure_list(&Value::Null), Vec::<Value>::new());
        assert_eq!(ensure_list(&json!([1, "a"])), vec![json!(1), json!("a")]);
        assert_eq!(
            ensure_list(&json!("a\n\n  \nb\n")),
            vec![json!("a"), json!("b")]
        );
        assert_eq!(ensure_list(&json!(7)), vec![json!(7)]);
        assert_eq!(ensure_list(&json!({"k": 1})), vec![json!({"k": 1})]);
    }

    #[test]
    fn ensure_list_is_idempotent() {
        for value in [json!(null), json!("x\ny"), json!([1, 2]), json!(false)] {
            let once = Value::Array(ensure_list(&value));
            assert_eq!(ensure_list(&once), ensure_list(&value));
        }
    }

    #[test]
    fn coerce_bool_recognizes_words() {
        for yes in ["true", " YES ", "1", "True"] {
            assert!(coerce_bool(&json!(yes)), "{yes}");
        }
        for no in ["false", "No", "0", "", "   "] {
            assert!(!coerce_bool(&json!(no)), "{no:?}");
        }
    }

    #[test]
    fn coerce_bool_falls_back_to_truthiness() {
        assert!(coerce_bool(&json!("maybe")));
        assert!(coerce_bool(&json!(2)));
        assert!(!coerce_bool(&json!(0)));
        assert!(!coerce_bool(&json!([])));
        assert!(coerce_bool(&json!([0])));
        assert!(!coerce_bool(&Value::Null));
    }

    #[test]
    fn normalize_separator_unescapes() {
        assert_eq!(normalize_separator(None), "");
        assert_eq!(normalize_separator(Some(&Value::Null)), "");
        assert_eq!(normalize_separator(Some(&json!("\\n- "))), "\n- ");
        assert_eq!(normalize_separator(Some(&json!("a\\tb"))), "a\tb");
        assert_eq!(normalize_separator(Some(&json!(3))), "3");
    }

    #[test]
    fn as_count_accepts_numeric_strings() {
        assert_eq!(as_count(&json!(3)), Some(3));
        assert_eq!(as_count(&json!(" 4 ")), Some(4));
        assert_eq!(as_count(&json!(2.0)), Some(2));
        assert_eq!(as_count(&json!(-1)), None);
        assert_eq!(as_count(&json!("many")), None);
    }
}
