//! 处理器 payload 宽松取值
//!
//! Stripe 风格的 payload 中金额可能是数字、数字字符串或 `{ "amount": n }` 对象。

use serde_json::Value;

/// 宽松解析整数金额
pub fn int_from_any(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        Value::Object(map) => map.get("amount").and_then(int_from_any),
        _ => None,
    }
}

/// 非空字符串字段
pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// 依次尝试多个 key
pub fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| str_field(value, k))
}
