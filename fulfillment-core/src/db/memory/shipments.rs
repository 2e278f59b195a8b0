use async_trait::async_trait;

use shared::models::Shipment;

use super::MemoryStore;
use crate::db::repository::{RepoError, RepoResult, ShipmentRepo};

#[derive(Debug, Clone)]
pub struct MemoryShipmentRepo {
    store: MemoryStore,
}

impl MemoryShipmentRepo {
    pub(crate) fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ShipmentRepo for MemoryShipmentRepo {
    async fn find_by_id(&self, order_id: &str, shipment_id: &str) -> RepoResult<Option<Shipment>> {
        self.store.read(|t| {
            t.shipments
                .get(shipment_id)
                .filter(|s| s.order_id == order_id)
                .cloned()
        })
    }

    async fn list_by_order(&self, order_id: &str) -> RepoResult<Vec<Shipment>> {
        let mut items: Vec<Shipment> = self.store.read(|t| {
            t.shipments
                .values()
                .filter(|s| s.order_id == order_id)
                .cloned()
                .collect()
        })?;
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn insert(&self, shipment: &Shipment) -> RepoResult<()> {
        self.store.write(|t| {
            if t.shipments.contains_key(&shipment.id) {
                return Err(RepoError::Conflict(format!(
                    "shipment {} already exists",
                    shipment.id
                )));
            }
            t.shipments.insert(shipment.id.clone(), shipment.clone());
            Ok(())
        })
    }
}
