//! Order Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Metadata;

/// Order status
///
/// Allowed transitions:
///
/// ```text
/// pending_payment ─▶ paid ─▶ in_production ─▶ ready_to_ship ─▶ shipped ─▶ delivered ─▶ completed
///        │            │  └──────────────┴──────────▶ shipped
///        ▼            ▼
///     canceled     canceled / refunded (paid and later)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    InProduction,
    ReadyToShip,
    Shipped,
    Delivered,
    Completed,
    Canceled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::Paid => "paid",
            Self::InProduction => "in_production",
            Self::ReadyToShip => "ready_to_ship",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Refunded => "refunded",
        }
    }

    /// Parse a status, tolerant of case and surrounding whitespace.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending_payment" => Some(Self::PendingPayment),
            "paid" => Some(Self::Paid),
            "in_production" => Some(Self::InProduction),
            "ready_to_ship" => Some(Self::ReadyToShip),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "completed" => Some(Self::Completed),
            "canceled" => Some(Self::Canceled),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (PendingPayment, Paid)
                | (PendingPayment, Canceled)
                | (Paid, InProduction)
                | (Paid, ReadyToShip)
                | (Paid, Shipped)
                | (Paid, Canceled)
                | (Paid, Refunded)
                | (InProduction, ReadyToShip)
                | (InProduction, Shipped)
                | (InProduction, Refunded)
                | (ReadyToShip, Shipped)
                | (ReadyToShip, Refunded)
                | (Shipped, Delivered)
                | (Shipped, Refunded)
                | (Delivered, Completed)
                | (Delivered, Refunded)
        )
    }

    /// Shipped or any later fulfilment state
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Shipped | Self::Delivered | Self::Completed)
    }

    /// No further production work expected
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::Shipped | Self::Delivered | Self::Completed | Self::Canceled | Self::Refunded
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monetary totals in minor units
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    #[serde(default)]
    pub subtotal: i64,
    #[serde(default)]
    pub discount: i64,
    #[serde(default)]
    pub shipping: i64,
    #[serde(default)]
    pub tax: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub sku: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAudit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub currency: String,
    pub totals: OrderTotals,
    #[serde(default)]
    pub items: Vec<OrderLineItem>,
    /// Production queue the order is assigned to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_queue_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub audit: OrderAudit,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Ordered quantity per normalized (trimmed, uppercase) SKU
    pub fn ordered_quantities(&self) -> std::collections::BTreeMap<String, i64> {
        let mut out = std::collections::BTreeMap::new();
        for item in &self.items {
            let sku = normalize_sku(&item.sku);
            if sku.is_empty() {
                continue;
            }
            *out.entry(sku).or_insert(0) += item.quantity.max(0);
        }
        out
    }
}

/// SKU comparison key
pub fn normalize_sku(sku: &str) -> String {
    sku.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_graph() {
        assert!(OrderStatus::PendingPayment.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::ReadyToShip.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::InProduction.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::PendingPayment.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Canceled.can_transition_to(OrderStatus::Paid));
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(OrderStatus::parse(" Ready_To_Ship "), Some(OrderStatus::ReadyToShip));
        assert_eq!(OrderStatus::parse("unknown"), None);
        let json = serde_json::to_string(&OrderStatus::PendingPayment).unwrap();
        assert_eq!(json, "\"pending_payment\"");
    }

    #[test]
    fn test_ordered_quantities_merges_case_insensitive_skus() {
        let now = Utc::now();
        let order = Order {
            id: "ord_1".into(),
            order_number: "HF-1".into(),
            status: OrderStatus::Paid,
            currency: "JPY".into(),
            totals: OrderTotals { total: 100, ..Default::default() },
            items: vec![
                OrderLineItem { sku: "sku-1".into(), name: None, quantity: 2, unit_price: 0 },
                OrderLineItem { sku: " SKU-1".into(), name: None, quantity: 1, unit_price: 0 },
            ],
            production_queue_id: None,
            paid_at: None,
            shipped_at: None,
            metadata: Metadata::new(),
            audit: OrderAudit::default(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(order.ordered_quantities().get("SKU-1"), Some(&3));
    }
}
