//! Loose scalar comparison over `serde_json::Value`.
//!
//! Admin-authored rule specs store comparison values as JSON, while record
//! attributes may be typed (`2`) or stringly (`"2"`). Every predicate goes
//! through these helpers so numeric/string coercion behaves the same
//! everywhere.

use serde_json::Value;

/// Equality with numeric/string coercion.
///
/// Two numbers compare as `f64`; a number and a numeric string compare as
/// numbers (`2 == "2"`); everything else falls back to exact comparison of
/// the canonical string rendering. `Null` only equals `Null`.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => display_string(a) == display_string(b),
        },
    }
}

/// Membership test against a JSON list, using [`loose_eq`] per element.
pub fn in_list(needle: &Value, list: &[Value]) -> bool {
    list.iter().any(|candidate| loose_eq(needle, candidate))
}

/// The `contains` operator: substring match for string attributes,
/// membership for list attributes.
pub fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => in_list(needle, items),
        Value::String(s) => s.contains(&display_string(needle)),
        _ => display_string(haystack).contains(&display_string(needle)),
    }
}

/// Whether a resolved attribute counts as "not set".
pub fn is_unset(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

/// Canonical string rendering used for comparison and template output.
///
/// Strings render without quotes; `Null` renders empty; compound values fall
/// back to their JSON encoding.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equal_strings_match() {
        assert!(loose_eq(&json!("open"), &json!("open")));
        assert!(!loose_eq(&json!("open"), &json!("closed")));
    }

    #[test]
    fn number_and_numeric_string_match() {
        assert!(loose_eq(&json!(2), &json!("2")));
        assert!(loose_eq(&json!("3.5"), &json!(3.5)));
        assert!(!loose_eq(&json!(2), &json!("20")));
    }

    #[test]
    fn null_only_equals_null() {
        assert!(loose_eq(&Value::Null, &Value::Null));
        assert!(!loose_eq(&Value::Null, &json!("")));
        assert!(!loose_eq(&json!(0), &Value::Null));
    }

    #[test]
    fn bool_comparison_is_exact() {
        assert!(loose_eq(&json!(true), &json!(true)));
        assert!(!loose_eq(&json!(true), &json!(false)));
    }

    #[test]
    fn list_membership_coerces() {
        let list = [json!(1), json!(2), json!(3)];
        assert!(in_list(&json!("2"), &list));
        assert!(!in_list(&json!(4), &list));
    }

    #[test]
    fn contains_substring() {
        assert!(contains(&json!("urgent: printer on fire"), &json!("printer")));
        assert!(!contains(&json!("all quiet"), &json!("printer")));
    }

    #[test]
    fn contains_list_membership() {
        assert!(contains(&json!(["vip", "billing"]), &json!("vip")));
        assert!(!contains(&json!(["vip", "billing"]), &json!("spam")));
    }

    #[test]
    fn unset_detection() {
        assert!(is_unset(None));
        assert!(is_unset(Some(&Value::Null)));
        assert!(is_unset(Some(&json!(""))));
        assert!(!is_unset(Some(&json!(0))));
        assert!(!is_unset(Some(&json!("x"))));
    }

    #[test]
    fn display_string_renderings() {
        assert_eq!(display_string(&json!("a")), "a");
        assert_eq!(display_string(&json!(7)), "7");
        assert_eq!(display_string(&Value::Null), "");
        assert_eq!(display_string(&json!(true)), "true");
    }
}
