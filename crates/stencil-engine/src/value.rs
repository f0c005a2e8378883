//! Runtime values
//!
//! Templates operate on `serde_json::Value`. Helpers here define how values
//! are tested, printed and compared.

use std::cmp::Ordering;

use serde_json::Value;

/// Template truthiness: false, 0, null and empty collections are false
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Text emitted for a value
///
/// Strings print raw, null prints nothing, collections print as compact JSON.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// Equality used by `eq` and `ne`
///
/// Numbers compare numerically. Mixed scalar kinds compare by their printed
/// form, so `eq .count "3"` holds when the context carries the string "3".
pub fn equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => a == b,
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => display(a) == display(b),
    }
}

/// Ordering used by `lt`, `le`, `gt` and `ge`
///
/// Only numbers against numbers and strings against strings are ordered.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Convert a YAML value into a template value
///
/// Fails on mappings with non-scalar keys.
pub fn from_yaml(value: &serde_yaml::Value) -> serde_json::Result<Value> {
    serde_json::to_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthy() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!([])));
        assert!(!truthy(&json!({})));

        assert!(truthy(&json!("false")));
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!(["a"])));
    }

    #[test]
    fn test_display() {
        assert_eq!(display(&json!(null)), "");
        assert_eq!(display(&json!("golang:latest")), "golang:latest");
        assert_eq!(display(&json!(1.5)), "1.5");
        assert_eq!(display(&json!(["a", 1])), r#"["a",1]"#);
    }

    #[test]
    fn test_equal() {
        assert!(equal(&json!("main"), &json!("main")));
        assert!(equal(&json!(3), &json!(3.0)));
        assert!(equal(&json!("3"), &json!(3)));
        assert!(equal(&json!("true"), &json!(true)));
        assert!(!equal(&json!(null), &json!("")));
        assert!(!equal(&json!(["a"]), &json!("a")));
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare(&json!(1), &json!(2)), Some(Ordering::Less));
        assert_eq!(compare(&json!("b"), &json!("a")), Some(Ordering::Greater));
        assert_eq!(compare(&json!("1"), &json!(2)), None);
    }

    #[test]
    fn test_from_yaml() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("a: [1, two]").unwrap();
        assert_eq!(from_yaml(&yaml).unwrap(), json!({"a": [1, "two"]}));
    }
}
