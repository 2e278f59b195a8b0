//! Stripe 风格 webhook 解析
//!
//! 只负责把原始 payload 解析为 [`WebhookEvent`] 并计算新的支付状态；
//! 查找订单/支付、去重与持久化由 [`PaymentService`](super::PaymentService) 完成。

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

use shared::models::{Metadata, Payment, RAW_LAST_WEBHOOK_EVENT, RAW_WEBHOOK_EVENTS, payment_status};
use shared::util::rfc3339_nano;

use super::error::{PaymentError, PaymentResult};
use crate::utils::json::{first_str, int_from_any, str_field};

pub const PROVIDER_STRIPE: &str = "stripe";

const EVENT_ID_HEADER: &str = "stripe-event-id";

/// Webhook 输入（原始字节 + 请求头）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentWebhookCommand {
    pub provider: String,
    pub payload: Vec<u8>,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    IntentSucceeded,
    IntentFailed,
    IntentCanceled,
    /// processing / requires_action 等中间状态
    IntentUpdated,
    ChargeRefunded,
}

impl WebhookKind {
    pub fn from_type(event_type: &str) -> Option<Self> {
        match event_type.trim() {
            "payment_intent.succeeded" => Some(Self::IntentSucceeded),
            "payment_intent.payment_failed" => Some(Self::IntentFailed),
            "payment_intent.canceled" => Some(Self::IntentCanceled),
            "payment_intent.processing"
            | "payment_intent.requires_action"
            | "payment_intent.amount_capturable_updated" => Some(Self::IntentUpdated),
            "charge.refunded" => Some(Self::ChargeRefunded),
            _ => None,
        }
    }

    fn is_intent(&self) -> bool {
        !matches!(self, Self::ChargeRefunded)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: String,
    #[serde(default, rename = "type")]
    event_type: String,
    #[serde(default)]
    created: Value,
    #[serde(default)]
    data: EnvelopeData,
}

#[derive(Debug, Default, Deserialize)]
struct EnvelopeData {
    #[serde(default)]
    object: Option<Value>,
    #[serde(default)]
    raw: Option<Value>,
}

/// 已识别的 webhook 事件
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub kind: WebhookKind,
    pub created: Option<DateTime<Utc>>,
    pub object: Metadata,
}

/// 解析 payload
///
/// Returns `Ok(None)` for event types the settlement engine does not handle.
pub fn parse_event(cmd: &PaymentWebhookCommand) -> PaymentResult<Option<WebhookEvent>> {
    let envelope: Envelope = serde_json::from_slice(&cmd.payload)
        .map_err(|e| PaymentError::InvalidInput(format!("malformed webhook payload: {}", e)))?;

    let id = match envelope.id.trim() {
        "" => header(&cmd.headers, EVENT_ID_HEADER).unwrap_or_default(),
        id => id.to_string(),
    };
    if id.is_empty() {
        return Err(PaymentError::InvalidInput("webhook event id is required".into()));
    }

    let event_type = envelope.event_type.trim().to_string();
    let Some(kind) = WebhookKind::from_type(&event_type) else {
        tracing::info!(event_id = %id, event_type = %event_type, "payments.webhook.ignored");
        return Ok(None);
    };

    let object = envelope
        .data
        .object
        .or(envelope.data.raw)
        .and_then(|v| v.as_object().cloned())
        .ok_or_else(|| PaymentError::InvalidInput("webhook data.object is required".into()))?;

    Ok(Some(WebhookEvent {
        id,
        event_type,
        kind,
        created: timestamp(&envelope.created),
        object,
    }))
}

fn header(headers: &BTreeMap<String, String>, name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(text) = value.as_str()
        && let Ok(parsed) = DateTime::parse_from_rfc3339(text.trim())
    {
        return Some(parsed.with_timezone(&Utc));
    }
    int_from_any(value)
        .filter(|secs| *secs > 0)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

impl WebhookEvent {
    fn metadata(&self) -> Option<&Value> {
        self.object.get("metadata").filter(|v| v.is_object())
    }

    pub fn order_id(&self) -> Option<&str> {
        self.metadata()
            .and_then(|m| first_str(m, &["order_id", "orderId", "orderID"]))
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.metadata()
            .and_then(|m| first_str(m, &["payment_id", "paymentId", "paymentID"]))
    }

    /// 关联的 PaymentIntent id
    ///
    /// Charge events prefer the explicit `payment_intent` (string or expanded object).
    pub fn intent_id(&self) -> Option<String> {
        let object = Value::Object(self.object.clone());
        if self.kind.is_intent() {
            return str_field(&object, "id").map(str::to_string);
        }
        match self.object.get("payment_intent") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(expanded @ Value::Object(_)) => str_field(expanded, "id").map(str::to_string),
            _ => None,
        }
    }

    pub fn currency(&self) -> Option<String> {
        self.object
            .get("currency")
            .and_then(Value::as_str)
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
    }

    /// 目标支付状态
    pub fn target_status(&self) -> &'static str {
        match self.kind {
            WebhookKind::ChargeRefunded => payment_status::REFUNDED,
            WebhookKind::IntentSucceeded => payment_status::SUCCEEDED,
            WebhookKind::IntentFailed | WebhookKind::IntentCanceled => payment_status::FAILED,
            WebhookKind::IntentUpdated => {
                let status = self
                    .object
                    .get("status")
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_ascii_lowercase())
                    .unwrap_or_default();
                match status.as_str() {
                    "succeeded" => payment_status::SUCCEEDED,
                    "canceled" | "requires_payment_method" => payment_status::FAILED,
                    _ => payment_status::PENDING,
                }
            }
        }
    }

    /// 最近一次 charge 的创建时间
    fn charge_created(&self) -> Option<DateTime<Utc>> {
        if let Some(latest) = self.object.get("latest_charge").filter(|v| v.is_object())
            && let Some(at) = latest.get("created").and_then(timestamp)
        {
            return Some(at);
        }
        self.object
            .get("charges")
            .and_then(|c| c.get("data"))
            .and_then(Value::as_array)
            .and_then(|data| data.first())
            .and_then(|charge| charge.get("created"))
            .and_then(timestamp)
    }

    /// 把事件应用到支付记录并登记到 `raw.webhookEvents`
    pub fn apply(&self, payment: &Payment, now: DateTime<Utc>) -> Payment {
        let mut updated = payment.clone();
        let occurred = self.created.unwrap_or(now);
        updated.status = self.target_status().to_string();

        if self.kind.is_intent() {
            if let Some(amount) = self
                .object
                .get("amount")
                .and_then(int_from_any)
                .filter(|a| *a > 0)
            {
                updated.amount = amount;
            }
            if let Some(currency) = self.currency() {
                updated.currency = currency;
            }
        }

        match self.kind {
            WebhookKind::IntentSucceeded => {
                updated.captured = true;
                if updated.captured_at.is_none() {
                    updated.captured_at = Some(self.charge_created().unwrap_or(occurred));
                }
            }
            WebhookKind::ChargeRefunded => {
                updated.refunded_at = Some(occurred);
            }
            _ => {}
        }

        for (key, value) in &self.object {
            if key == RAW_WEBHOOK_EVENTS || key == RAW_LAST_WEBHOOK_EVENT {
                continue;
            }
            updated.raw.insert(key.clone(), value.clone());
        }
        self.record_bookkeeping(&mut updated.raw, now);
        updated.updated_at = now;
        updated
    }

    fn record_bookkeeping(&self, raw: &mut Metadata, now: DateTime<Utc>) {
        let entry = json!({
            "type": self.event_type,
            "createdAt": self.created.map(|at| rfc3339_nano(&at)),
            "processedAt": rfc3339_nano(&now),
        });
        let mut events = raw
            .get(RAW_WEBHOOK_EVENTS)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        events.insert(self.id.clone(), entry.clone());
        raw.insert(RAW_WEBHOOK_EVENTS.into(), Value::Object(events));

        let mut last = entry;
        last["id"] = Value::String(self.id.clone());
        raw.insert(RAW_LAST_WEBHOOK_EVENT.into(), last);
    }
}
