use async_trait::async_trait;
use chrono::{DateTime, Utc};

use shared::models::Payment;

use super::{MemoryStore, check_version};
use crate::db::repository::{PaymentRepo, RepoError, RepoResult};

#[derive(Debug, Clone)]
pub struct MemoryPaymentRepo {
    store: MemoryStore,
}

impl MemoryPaymentRepo {
    pub(crate) fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PaymentRepo for MemoryPaymentRepo {
    async fn find_by_id(&self, order_id: &str, payment_id: &str) -> RepoResult<Option<Payment>> {
        self.store.read(|t| {
            t.payments
                .get(payment_id)
                .filter(|p| p.order_id == order_id)
                .cloned()
        })
    }

    async fn list_by_order(&self, order_id: &str) -> RepoResult<Vec<Payment>> {
        let mut items: Vec<Payment> = self.store.read(|t| {
            t.payments
                .values()
                .filter(|p| p.order_id == order_id)
                .cloned()
                .collect()
        })?;
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn insert(&self, payment: &Payment) -> RepoResult<()> {
        self.store.write(|t| {
            if t.payments.contains_key(&payment.id) {
                return Err(RepoError::Conflict(format!(
                    "payment {} already exists",
                    payment.id
                )));
            }
            t.payments.insert(payment.id.clone(), payment.clone());
            Ok(())
        })
    }

    async fn update(
        &self,
        payment: &Payment,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> RepoResult<()> {
        self.store.write(|t| {
            let existing = t
                .payments
                .get_mut(&payment.id)
                .filter(|p| p.order_id == payment.order_id)
                .ok_or_else(|| RepoError::NotFound(format!("payment {}", payment.id)))?;
            check_version("payment", &payment.id, existing.updated_at, expected_updated_at)?;
            *existing = payment.clone();
            Ok(())
        })
    }
}
