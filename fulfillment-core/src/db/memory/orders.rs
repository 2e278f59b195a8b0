use async_trait::async_trait;
use chrono::{DateTime, Utc};

use shared::models::Order;

use super::{MemoryStore, check_version, paginate};
use crate::db::repository::{
    OrderListFilter, OrderRepo, Page, Pagination, RepoError, RepoResult, SortOrder,
};

#[derive(Debug, Clone)]
pub struct MemoryOrderRepo {
    store: MemoryStore,
}

impl MemoryOrderRepo {
    pub(crate) fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OrderRepo for MemoryOrderRepo {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Order>> {
        self.store.read(|t| t.orders.get(id).cloned())
    }

    async fn list(&self, filter: &OrderListFilter, page: &Pagination) -> RepoResult<Page<Order>> {
        let mut items: Vec<Order> = self.store.read(|t| {
            t.orders
                .values()
                .filter(|o| filter.matches(o))
                .cloned()
                .collect()
        })?;
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        if filter.sort == SortOrder::Desc {
            items.reverse();
        }
        paginate(items, page)
    }

    async fn insert(&self, order: &Order) -> RepoResult<()> {
        self.store.write(|t| {
            if t.orders.contains_key(&order.id) {
                return Err(RepoError::Conflict(format!("order {} already exists", order.id)));
            }
            t.orders.insert(order.id.clone(), order.clone());
            Ok(())
        })
    }

    async fn update(
        &self,
        order: &Order,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> RepoResult<()> {
        self.store.write(|t| {
            let existing = t
                .orders
                .get_mut(&order.id)
                .ok_or_else(|| RepoError::NotFound(format!("order {}", order.id)))?;
            check_version("order", &order.id, existing.updated_at, expected_updated_at)?;
            *existing = order.clone();
            Ok(())
        })
    }
}
