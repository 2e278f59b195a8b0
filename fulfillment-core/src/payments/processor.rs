//! 支付处理器端口
//!
//! 手动请款/退款通过该端口调用外部处理器（Stripe 等）；
//! 返回的 [`PaymentDetails`] 覆盖本地支付记录。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

use shared::models::{Metadata, Payment, RAW_LAST_WEBHOOK_EVENT, RAW_WEBHOOK_EVENTS};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    /// Processor rejected the request shape
    #[error("invalid processor request: {0}")]
    Invalid(String),

    #[error("processor unavailable: {0}")]
    Unavailable(String),

    #[error("processor declined: {0}")]
    Declined(String),
}

/// 调用上下文
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentContext {
    pub preferred_provider: String,
    /// Uppercase ISO code
    pub currency: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureRequest {
    pub intent_id: String,
    /// `None` captures the full authorized amount
    pub amount: Option<i64>,
    pub idempotency_key: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefundRequest {
    pub intent_id: String,
    /// `None` refunds the remaining captured amount
    pub amount: Option<i64>,
    pub reason: String,
    pub idempotency_key: String,
    pub metadata: BTreeMap<String, String>,
}

/// 处理器返回的支付状态
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentDetails {
    pub provider: String,
    pub intent_id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub captured: bool,
    pub captured_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub raw: Metadata,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn capture(
        &self,
        ctx: &PaymentContext,
        req: CaptureRequest,
    ) -> Result<PaymentDetails, ProcessorError>;

    async fn refund(
        &self,
        ctx: &PaymentContext,
        req: RefundRequest,
    ) -> Result<PaymentDetails, ProcessorError>;
}

/// 将处理器结果写回支付记录
///
/// Amount and currency only overwrite when present. A non-empty `raw` replaces
/// the stored payload but webhook bookkeeping keys survive.
pub fn apply_payment_details(
    payment: &Payment,
    details: &PaymentDetails,
    now: DateTime<Utc>,
) -> Payment {
    let mut updated = payment.clone();
    let status = details.status.trim();
    if !status.is_empty() {
        updated.status = status.to_string();
    }
    if details.amount > 0 {
        updated.amount = details.amount;
    }
    let currency = details.currency.trim();
    if !currency.is_empty() {
        updated.currency = currency.to_ascii_uppercase();
    }
    // 请款状态只进不退
    updated.captured = payment.captured || details.captured;
    updated.captured_at = details.captured_at.or(payment.captured_at);
    updated.refunded_at = details.refunded_at.or(payment.refunded_at);
    if !details.raw.is_empty() {
        let mut raw = details.raw.clone();
        for key in [RAW_WEBHOOK_EVENTS, RAW_LAST_WEBHOOK_EVENT] {
            raw.remove(key);
            if let Some(value) = payment.raw.get(key) {
                raw.insert(key.to_string(), value.clone());
            }
        }
        updated.raw = raw;
    }
    updated.updated_at = now;
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_payment;
    use serde_json::json;

    #[test]
    fn test_apply_details_keeps_bookkeeping_keys() {
        let mut payment = sample_payment("pay_1", "ord_1", 10000);
        payment.raw.insert("amount_received".into(), json!(10000));
        payment
            .raw
            .insert(RAW_WEBHOOK_EVENTS.into(), json!({"evt_1": {"type": "x"}}));

        let now = Utc::now();
        let mut raw = Metadata::new();
        raw.insert("amount_refunded".into(), json!(4000));
        let details = PaymentDetails {
            status: "refunded".into(),
            currency: "jpy".into(),
            captured: true,
            raw,
            ..Default::default()
        };

        let updated = apply_payment_details(&payment, &details, now);
        assert_eq!(updated.status, "refunded");
        assert_eq!(updated.currency, "JPY");
        assert_eq!(updated.amount, 10000);
        assert!(updated.raw.get("amount_received").is_none());
        assert_eq!(updated.raw["amount_refunded"], json!(4000));
        assert!(updated.webhook_event_seen("evt_1"));
        assert_eq!(updated.updated_at, now);
    }

    #[test]
    fn test_apply_details_without_raw_keeps_payload() {
        let mut payment = sample_payment("pay_1", "ord_1", 10000);
        payment.raw.insert("amount_received".into(), json!(10000));
        let details = PaymentDetails {
            status: " ".into(),
            captured: true,
            ..Default::default()
        };
        let updated = apply_payment_details(&payment, &details, Utc::now());
        assert_eq!(updated.status, payment.status);
        assert!(updated.captured);
        assert_eq!(updated.raw["amount_received"], json!(10000));
    }
}
