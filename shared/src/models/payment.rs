//! Payment Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Metadata;

/// Well-known processor status strings
///
/// Payment status is processor defined, so it stays a string; these are the
/// values the settlement engine itself writes or branches on.
pub mod payment_status {
    pub const PENDING: &str = "pending";
    pub const REQUIRES_CAPTURE: &str = "requires_capture";
    pub const SUCCEEDED: &str = "succeeded";
    pub const FAILED: &str = "failed";
    pub const REFUNDED: &str = "refunded";
}

/// Keys inside `Payment.raw` owned by webhook bookkeeping
pub const RAW_WEBHOOK_EVENTS: &str = "webhookEvents";
pub const RAW_LAST_WEBHOOK_EVENT: &str = "lastWebhookEvent";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub provider: String,
    #[serde(default)]
    pub intent_id: String,
    pub status: String,
    /// Authorized amount in minor units
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub captured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<DateTime<Utc>>,
    /// Opaque processor payload plus webhook bookkeeping
    #[serde(default)]
    pub raw: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn status_is(&self, status: &str) -> bool {
        self.status.trim().eq_ignore_ascii_case(status)
    }

    /// Processed webhook event ids
    pub fn webhook_event_seen(&self, event_id: &str) -> bool {
        self.raw
            .get(RAW_WEBHOOK_EVENTS)
            .and_then(|v| v.as_object())
            .is_some_and(|events| events.contains_key(event_id))
    }
}

/// Derived summary stored under `Order.metadata["payment"]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub status: String,
    pub captured_amount: i64,
    pub refunded_amount: i64,
    pub balance_due: i64,
    pub updated_at: String,
}
