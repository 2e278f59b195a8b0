//! 从处理器 payload 推导请款/退款金额
//!
//! 请款优先级：
//!
//! ```text
//! amount_received
//!   → charges.amount_captured / Σ charges.data[].amount_captured / latest_charge.amount_captured
//!   → amount_captured
//!   → latest_charge.amount（latest_charge.captured 为真时）
//!   → payment.amount（payment.captured 为真时）
//! ```

use serde_json::Value;

use shared::models::{Metadata, Payment, payment_status};

use crate::utils::json::int_from_any;

fn positive(value: Option<&Value>) -> Option<i64> {
    value.and_then(int_from_any).filter(|amount| *amount > 0)
}

/// 已请款金额；未请款且状态不是 succeeded/refunded 时为 0
pub fn captured_amount(payment: &Payment) -> i64 {
    if !payment.captured
        && !payment.status_is(payment_status::SUCCEEDED)
        && !payment.status_is(payment_status::REFUNDED)
    {
        return 0;
    }
    let raw = &payment.raw;
    positive(raw.get("amount_received"))
        .or_else(|| extract_charge_amount(raw, "amount_captured"))
        .or_else(|| positive(raw.get("amount_captured")))
        .or_else(|| latest_captured_charge(raw))
        .or_else(|| (payment.captured && payment.amount > 0).then_some(payment.amount))
        .unwrap_or(0)
}

pub fn refunded_amount(payment: &Payment) -> i64 {
    let raw = &payment.raw;
    positive(raw.get("amount_refunded"))
        .or_else(|| extract_charge_amount(raw, "amount_refunded"))
        .unwrap_or(0)
}

/// 可退款余额（已请款 − 已退款）
///
/// Falls back to the authorized amount when the payload carries no captured total.
pub fn refundable_amount(payment: &Payment) -> i64 {
    let captured = match captured_amount(payment) {
        0 => payment.amount,
        n => n,
    };
    (captured - refunded_amount(payment)).max(0)
}

fn extract_charge_amount(raw: &Metadata, key: &str) -> Option<i64> {
    if let Some(charges) = raw.get("charges").and_then(Value::as_object) {
        if let Some(amount) = positive(charges.get(key)) {
            return Some(amount);
        }
        if let Some(data) = charges.get("data").and_then(Value::as_array) {
            let total: i64 = data
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|charge| positive(charge.get(key)))
                .sum();
            if total > 0 {
                return Some(total);
            }
        }
    }
    raw.get("latest_charge")
        .and_then(Value::as_object)
        .and_then(|latest| positive(latest.get(key)))
}

fn latest_captured_charge(raw: &Metadata) -> Option<i64> {
    let latest = raw.get("latest_charge")?.as_object()?;
    if !bool_from_any(latest.get("captured")) {
        return None;
    }
    positive(latest.get("amount"))
}

fn bool_from_any(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_payment;
    use serde_json::json;

    fn with_raw(raw: Value, captured: bool, status: &str) -> Payment {
        let mut payment = sample_payment("pay_1", "ord_1", 9000);
        payment.captured = captured;
        payment.status = status.into();
        payment.raw = raw.as_object().cloned().unwrap_or_default();
        payment
    }

    #[test]
    fn test_uncaptured_payment_has_no_captured_amount() {
        let payment = with_raw(json!({"amount_received": 9000}), false, "requires_capture");
        assert_eq!(captured_amount(&payment), 0);
    }

    #[test]
    fn test_captured_amount_sums_nested_charges() {
        let payment = with_raw(
            json!({"charges": {"data": [
                {"amount_captured": 3000},
                {"amount_captured": "2000"},
                {"amount_captured": 0}
            ]}}),
            false,
            "succeeded",
        );
        assert_eq!(captured_amount(&payment), 5000);
    }

    #[test]
    fn test_captured_amount_uses_latest_charge_only_when_captured() {
        let payment = with_raw(
            json!({"latest_charge": {"captured": "true", "amount": 7000}}),
            false,
            "succeeded",
        );
        assert_eq!(captured_amount(&payment), 7000);

        let payment = with_raw(
            json!({"latest_charge": {"captured": false, "amount": 7000}}),
            false,
            "succeeded",
        );
        assert_eq!(captured_amount(&payment), 0);
    }

    #[test]
    fn test_captured_amount_falls_back_to_authorized() {
        let payment = with_raw(json!({}), true, "succeeded");
        assert_eq!(captured_amount(&payment), 9000);
    }

    #[test]
    fn test_refunded_amount_from_charge() {
        let payment = with_raw(
            json!({"latest_charge": {"amount_refunded": 1500}}),
            true,
            "refunded",
        );
        assert_eq!(refunded_amount(&payment), 1500);
    }

    #[test]
    fn test_refundable_is_net_of_refunds() {
        let payment = with_raw(
            json!({"amount_received": 9000, "amount_refunded": 4000}),
            true,
            "succeeded",
        );
        assert_eq!(refundable_amount(&payment), 5000);
    }
}
