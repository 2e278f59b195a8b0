//! Order lifecycle events emitted on the event bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Metadata;

pub const EVENT_ORDER_STATUS_CHANGED: &str = "order.status_changed";
pub const EVENT_SHIPMENT_CREATED: &str = "shipment.created";

/// Event envelope
///
/// `{ type, orderId, orderNumber, previousStatus?, currentStatus?, actorId?, occurredAt, metadata? }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub order_id: String,
    pub order_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}
