//! Invoice Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    Sent,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Issued => "issued",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Void => "void",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    /// `/orders/<orderID>`
    pub order_ref: String,
    pub status: InvoiceStatus,
    pub amount: i64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_asset_ref: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Order id referenced by `order_ref`
    pub fn order_id(&self) -> &str {
        self.order_ref
            .strip_prefix("/orders/")
            .unwrap_or(&self.order_ref)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchJobStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceBatchSummary {
    pub total_orders: usize,
    pub issued: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceBatchFailure {
    pub order_id: String,
    pub error: String,
}

/// Filter snapshot; instants are RFC3339Nano strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceBatchFilters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placed_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placed_to: Option<String>,
}

/// Single record describing one invoice batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceBatchJob {
    pub id: String,
    pub requested_by: String,
    pub status: BatchJobStatus,
    pub order_ids: Vec<String>,
    pub filters: InvoiceBatchFilters,
    pub summary: InvoiceBatchSummary,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
