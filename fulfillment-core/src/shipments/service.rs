//! 发货服务
//!
//! ```text
//! CreateShipmentCommand
//!   │ 校验：订单 id / 承运商 / 明细
//!   ▼
//! UnitOfWork ─┬─ 订单 + 已有发货单 → 各 SKU 剩余数量
//!             ├─ 面单（auto 且配置了 provider）
//!             ├─ 插入发货单（label_created 事件）
//!             └─ 全部发完 → 订单 → shipped
//!   ▼
//! 提交后发布 shipment.created / order.status_changed（失败只记日志）
//! ```

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use shared::models::{
    EVENT_ORDER_STATUS_CHANGED, EVENT_SHIPMENT_CREATED, Metadata, Order, OrderEvent, OrderStatus,
    Shipment, ShipmentEvent, ShipmentItem, ShipmentStatus, TrackingPreference, normalize_sku,
};

use super::error::{ShipmentError, ShipmentResult};
use super::labels::{ShipmentPackage, ShippingLabelProvider, ShippingLabelRequest};
use crate::core::{Clock, IdGenerator};
use crate::db::{OrderRepo, PassThroughUnitOfWork, ShipmentRepo, UnitOfWork, run_in_tx};
use crate::events::{EventPublisher, NoopEventPublisher};

const SHIPMENT_ID_PREFIX: &str = "shp_";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShipmentCommand {
    pub order_id: String,
    pub carrier: String,
    #[serde(default)]
    pub service_level: String,
    #[serde(default)]
    pub tracking_preference: String,
    #[serde(default)]
    pub package: Option<ShipmentPackage>,
    #[serde(default)]
    pub items: Vec<ShipmentItem>,
    #[serde(default)]
    pub manual_tracking_code: Option<String>,
    #[serde(default)]
    pub created_by: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateShipmentCommand {
    pub order_id: String,
    pub shipment_id: String,
    pub status: String,
    #[serde(default)]
    pub actor_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentEventCommand {
    pub carrier: String,
    pub tracking_code: String,
    pub status: String,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: Metadata,
}

/// 事务内产出，提交后用于发布事件
struct CreateOutcome {
    shipment: Shipment,
    order_number: String,
    previous_status: OrderStatus,
    promoted: bool,
}

pub struct ShipmentService {
    orders: Arc<dyn OrderRepo>,
    shipments: Arc<dyn ShipmentRepo>,
    labels: Option<Arc<dyn ShippingLabelProvider>>,
    events: Arc<dyn EventPublisher>,
    uow: Arc<dyn UnitOfWork>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl ShipmentService {
    pub fn new(
        orders: Arc<dyn OrderRepo>,
        shipments: Arc<dyn ShipmentRepo>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            orders,
            shipments,
            labels: None,
            events: Arc::new(NoopEventPublisher),
            uow: Arc::new(PassThroughUnitOfWork),
            clock,
            ids,
        }
    }

    pub fn with_label_provider(mut self, labels: Arc<dyn ShippingLabelProvider>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    pub fn with_unit_of_work(mut self, uow: Arc<dyn UnitOfWork>) -> Self {
        self.uow = uow;
        self
    }

    pub async fn create_shipment(&self, cmd: CreateShipmentCommand) -> ShipmentResult<Shipment> {
        let order_id = cmd.order_id.trim().to_string();
        if order_id.is_empty() {
            return Err(ShipmentError::InvalidInput("order id is required".into()));
        }
        let carrier = cmd.carrier.trim().to_ascii_uppercase();
        if carrier.is_empty() {
            return Err(ShipmentError::InvalidInput("carrier is required".into()));
        }
        let items = normalize_items(&cmd.items)?;

        let now = self.clock.now();
        let service_level = cmd.service_level.trim().to_string();
        let preference = TrackingPreference::parse(&cmd.tracking_preference);
        let actor = cmd.created_by.trim().to_string();

        let outcome = run_in_tx(self.uow.as_ref(), || async {
            let mut order = self
                .orders
                .find_by_id(&order_id)
                .await
                .map_err(ShipmentError::from_order_repo)?
                .ok_or_else(|| ShipmentError::OrderNotFound(order_id.clone()))?;
            let previous_status = order.status;
            let order_number = order.order_number.trim().to_string();

            let mut existing = self.shipments.list_by_order(&order_id).await?;
            validate_quantities(&order, &existing, &items)?;

            let mut shipment = Shipment {
                id: format!("{}{}", SHIPMENT_ID_PREFIX, self.ids.new_id()),
                order_id: order_id.clone(),
                carrier: carrier.clone(),
                service: (!service_level.is_empty()).then(|| service_level.clone()),
                status: ShipmentStatus::LabelCreated,
                tracking_code: None,
                label_url: None,
                documents: Vec::new(),
                eta: None,
                items: items.clone(),
                events: Vec::new(),
                created_by: (!actor.is_empty()).then(|| actor.clone()),
                created_at: now,
                updated_at: now,
            };

            let mut details = Metadata::new();
            details.insert("carrier".into(), json!(carrier));
            details.insert("trackingPreference".into(), json!(preference.as_str()));
            if !service_level.is_empty() {
                details.insert("serviceLevel".into(), json!(service_level));
            }
            if let Some(package) = &cmd.package {
                details.insert("package".into(), package.to_details());
            }

            if let Some(labels) = self.labels.as_ref().filter(|_| preference.wants_label()) {
                let label = labels
                    .create_shipping_label(ShippingLabelRequest {
                        order_id: order_id.clone(),
                        order_number: order_number.clone(),
                        carrier: carrier.clone(),
                        service_level: service_level.clone(),
                        tracking_preference: preference.as_str().to_string(),
                        package: cmd.package.clone(),
                        items: items.clone(),
                        actor_id: actor.clone(),
                        requested_at: now,
                    })
                    .await
                    .map_err(|e| {
                        ShipmentError::InvalidInput(format!("label generation failed: {}", e))
                    })?;
                let tracking = label.tracking_number.trim();
                if !tracking.is_empty() {
                    shipment.tracking_code = Some(tracking.to_string());
                }
                shipment.label_url = label
                    .label_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string);
                shipment.eta = label.estimated_delivery;
                shipment.documents = label.documents;
                for (key, value) in label.metadata {
                    details.insert(key, value);
                }
            }

            if let Some(manual) = shared::util::non_blank(cmd.manual_tracking_code.as_deref()) {
                shipment.tracking_code = Some(manual);
            }

            shipment.events.push(ShipmentEvent {
                status: ShipmentStatus::LabelCreated,
                occurred_at: now,
                details,
            });
            self.shipments.insert(&shipment).await?;
            existing.push(shipment.clone());

            let mut promoted = false;
            if is_fully_shipped(&order, &existing) && !order.status.is_fulfilled() {
                if !order.status.can_transition_to(OrderStatus::Shipped) {
                    return Err(ShipmentError::Conflict(format!(
                        "cannot transition order {} from {} to shipped",
                        order.id, order.status
                    )));
                }
                let expected = order.updated_at;
                order.status = OrderStatus::Shipped;
                order.updated_at = now;
                if order.shipped_at.is_none() {
                    order.shipped_at = Some(now);
                }
                if !actor.is_empty() {
                    order.audit.updated_by = Some(actor.clone());
                }
                self.orders
                    .update(&order, Some(expected))
                    .await
                    .map_err(ShipmentError::from_order_repo)?;
                promoted = true;
            }

            Ok(CreateOutcome {
                shipment,
                order_number,
                previous_status,
                promoted,
            })
        })
        .await?;

        tracing::info!(
            order_id = %order_id,
            shipment_id = %outcome.shipment.id,
            carrier = %carrier,
            promoted = outcome.promoted,
            "Shipment created"
        );

        self.publish_shipment_created(&outcome, &actor).await;
        if outcome.promoted {
            self.publish(OrderEvent {
                event_type: EVENT_ORDER_STATUS_CHANGED.into(),
                order_id: outcome.shipment.order_id.clone(),
                order_number: outcome.order_number.clone(),
                previous_status: Some(outcome.previous_status.as_str().into()),
                current_status: Some(OrderStatus::Shipped.as_str().into()),
                actor_id: (!actor.is_empty()).then(|| actor.clone()),
                occurred_at: now,
                metadata: None,
            })
            .await;
        }
        Ok(outcome.shipment)
    }

    pub async fn list_shipments(&self, order_id: &str) -> ShipmentResult<Vec<Shipment>> {
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(ShipmentError::InvalidInput("order id is required".into()));
        }
        Ok(self.shipments.list_by_order(order_id).await?)
    }

    pub async fn get_shipment(&self, order_id: &str, shipment_id: &str) -> ShipmentResult<Shipment> {
        let order_id = order_id.trim();
        let shipment_id = shipment_id.trim();
        if order_id.is_empty() || shipment_id.is_empty() {
            return Err(ShipmentError::InvalidInput(
                "order id and shipment id are required".into(),
            ));
        }
        self.shipments
            .find_by_id(order_id, shipment_id)
            .await?
            .ok_or_else(|| ShipmentError::NotFound(shipment_id.to_string()))
    }

    pub async fn update_shipment_status(
        &self,
        _cmd: UpdateShipmentCommand,
    ) -> ShipmentResult<Shipment> {
        Err(ShipmentError::Unsupported("update shipment status"))
    }

    pub async fn record_carrier_event(&self, _cmd: ShipmentEventCommand) -> ShipmentResult<()> {
        Err(ShipmentError::Unsupported("record carrier event"))
    }

    // ========================================================================
    // Events
    // ========================================================================

    async fn publish_shipment_created(&self, outcome: &CreateOutcome, actor: &str) {
        let shipment = &outcome.shipment;
        let mut metadata = Metadata::new();
        metadata.insert("shipmentId".into(), json!(shipment.id));
        metadata.insert("carrier".into(), json!(shipment.carrier));
        if let Some(tracking) = &shipment.tracking_code {
            metadata.insert("trackingNumber".into(), json!(tracking));
        }
        if let Some(service) = &shipment.service {
            metadata.insert("serviceLevel".into(), json!(service));
        }
        self.publish(OrderEvent {
            event_type: EVENT_SHIPMENT_CREATED.into(),
            order_id: shipment.order_id.clone(),
            order_number: outcome.order_number.clone(),
            previous_status: None,
            current_status: None,
            actor_id: (!actor.is_empty()).then(|| actor.to_string()),
            occurred_at: shipment.created_at,
            metadata: Some(metadata),
        })
        .await;
    }

    async fn publish(&self, event: OrderEvent) {
        let event_type = event.event_type.clone();
        let order_id = event.order_id.clone();
        let status = event.current_status.clone().unwrap_or_default();
        if let Err(e) = self.events.publish_order_event(event).await {
            tracing::warn!(
                event_type = %event_type,
                order_id = %order_id,
                status = %status,
                error = %e,
                "shipment.event.publish.failed"
            );
        }
    }
}

// ============================================================================
// Quantities
// ============================================================================

fn normalize_items(items: &[ShipmentItem]) -> ShipmentResult<Vec<ShipmentItem>> {
    if items.is_empty() {
        return Err(ShipmentError::InvalidInput(
            "at least one shipment item is required".into(),
        ));
    }
    items
        .iter()
        .map(|item| {
            let sku = item.line_item_sku.trim();
            if sku.is_empty() {
                return Err(ShipmentError::InvalidInput("line item sku is required".into()));
            }
            if item.quantity <= 0 {
                return Err(ShipmentError::InvalidInput(format!(
                    "quantity for sku {} must be positive",
                    sku
                )));
            }
            Ok(ShipmentItem {
                line_item_sku: sku.to_string(),
                quantity: item.quantity,
            })
        })
        .collect()
}

/// 各 SKU 剩余可发数量（负数截为 0）
pub fn remaining_quantities(order: &Order, shipments: &[Shipment]) -> BTreeMap<String, i64> {
    let mut remaining = order.ordered_quantities();
    for item in shipments.iter().flat_map(|s| &s.items) {
        let sku = normalize_sku(&item.line_item_sku);
        if let Some(qty) = remaining.get_mut(&sku) {
            *qty -= item.quantity;
        }
    }
    for qty in remaining.values_mut() {
        *qty = (*qty).max(0);
    }
    remaining
}

fn validate_quantities(
    order: &Order,
    existing: &[Shipment],
    items: &[ShipmentItem],
) -> ShipmentResult<()> {
    if order.items.is_empty() {
        return Err(ShipmentError::Conflict(format!(
            "order {} has no line items",
            order.id
        )));
    }
    let remaining = remaining_quantities(order, existing);
    let mut requested: BTreeMap<String, i64> = BTreeMap::new();
    for item in items {
        *requested.entry(normalize_sku(&item.line_item_sku)).or_insert(0) += item.quantity;
    }
    for (sku, qty) in &requested {
        let Some(available) = remaining.get(sku) else {
            return Err(ShipmentError::InvalidInput(format!(
                "line item {} is not part of this order",
                sku
            )));
        };
        if qty > available {
            return Err(ShipmentError::Conflict(format!(
                "remaining quantity for sku {} is {}",
                sku, available
            )));
        }
    }
    Ok(())
}

fn is_fully_shipped(order: &Order, shipments: &[Shipment]) -> bool {
    remaining_quantities(order, shipments)
        .values()
        .all(|qty| *qty == 0)
}
