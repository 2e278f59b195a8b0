//! 承运商面单端口

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use shared::models::{Metadata, ShipmentItem};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("carrier rejected label request: {0}")]
    Rejected(String),

    #[error("carrier unavailable: {0}")]
    Unavailable(String),
}

/// 包裹尺寸
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShipmentPackage {
    #[serde(default)]
    pub length: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub unit: String,
}

impl ShipmentPackage {
    pub(crate) fn to_details(&self) -> serde_json::Value {
        json!({
            "length": self.length,
            "width": self.width,
            "height": self.height,
            "weight": self.weight,
            "unit": self.unit.trim(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShippingLabelRequest {
    pub order_id: String,
    pub order_number: String,
    /// Uppercase carrier code
    pub carrier: String,
    pub service_level: String,
    pub tracking_preference: String,
    pub package: Option<ShipmentPackage>,
    pub items: Vec<ShipmentItem>,
    pub actor_id: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShippingLabel {
    pub tracking_number: String,
    pub label_url: Option<String>,
    pub documents: Vec<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    /// Merged into the `label_created` event details
    pub metadata: Metadata,
}

#[async_trait]
pub trait ShippingLabelProvider: Send + Sync {
    async fn create_shipping_label(
        &self,
        req: ShippingLabelRequest,
    ) -> Result<ShippingLabel, LabelError>;
}
