//! 审计日志 diff 计算
//!
//! 对选定字段做深度比较，生成 `{field: {before, after}}`。
//! 浮点数使用容差比较避免精度问题。

use serde_json::Value;

use super::types::{AuditDiff, FieldChange};

/// 浮点数比较容差
const FLOAT_EPSILON: f64 = 1e-9;

/// 递归比较两个 JSON 值是否相等（浮点数使用容差比较）
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(ia), Some(ib)) => ia == ib,
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(fa), Some(fb)) => (fa - fb).abs() < FLOAT_EPSILON,
                _ => a == b,
            },
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(va, vb)| values_equal(va, vb))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, va)| b.get(key).is_some_and(|vb| values_equal(va, vb)))
        }
        _ => false,
    }
}

/// 比较两个快照的指定字段
///
/// 缺失字段视为 `null`；`before` 为 `Value::Null` 时表示创建，`after` 为 `Value::Null` 时表示删除。
pub fn diff_fields(before: &Value, after: &Value, fields: &[&str]) -> AuditDiff {
    let mut diff = AuditDiff::new();
    for field in fields {
        let from = before.get(field).cloned().unwrap_or(Value::Null);
        let to = after.get(field).cloned().unwrap_or(Value::Null);
        if !values_equal(&from, &to) {
            diff.insert(
                (*field).to_string(),
                FieldChange {
                    before: from,
                    after: to,
                },
            );
        }
    }
    diff
}

/// 单字段变更（值不同时写入）
pub fn push_change(diff: &mut AuditDiff, field: &str, before: Value, after: Value) {
    if !values_equal(&before, &after) {
        diff.insert(field.to_string(), FieldChange { before, after });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_diff_only_changed_fields() {
        let before = json!({"name": "Engrave A", "capacity": 10, "workCenters": ["a", "b"]});
        let after = json!({"name": "Engrave A", "capacity": 12, "workCenters": ["a", "b"]});
        let diff = diff_fields(&before, &after, &["name", "capacity", "workCenters"]);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff["capacity"].before, json!(10));
        assert_eq!(diff["capacity"].after, json!(12));
    }

    #[test]
    fn test_create_diff_against_null() {
        let after = json!({"name": "Q", "notes": ""});
        let diff = diff_fields(&Value::Null, &after, &["name", "notes", "metadata"]);
        assert!(diff.contains_key("name"));
        assert!(diff.contains_key("notes"));
        assert!(!diff.contains_key("metadata"));
    }

    #[test]
    fn test_float_tolerance_and_nested_objects() {
        assert!(values_equal(&json!(0.1 + 0.2), &json!(0.3)));
        assert!(values_equal(&json!({"a": {"b": [1, 2]}}), &json!({"a": {"b": [1, 2]}})));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!values_equal(&json!(["a", "b"]), &json!(["b", "a"])));
    }

    #[test]
    fn test_push_change_skips_equal() {
        let mut diff = AuditDiff::new();
        push_change(&mut diff, "status", json!("a"), json!("a"));
        push_change(&mut diff, "captured", json!(false), json!(true));
        assert_eq!(diff.len(), 1);
        assert!(diff.contains_key("captured"));
    }
}
