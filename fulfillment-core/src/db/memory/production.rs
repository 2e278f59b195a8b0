use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use shared::models::{ProductionCard, ProductionQueue, QueueWipSummary, Stage};

use super::{MemoryStore, check_version, paginate};
use crate::db::repository::{
    Page, Pagination, ProductionCardRepo, ProductionQueueRepo, QueueListFilter, RepoError,
    RepoResult,
};

#[derive(Debug, Clone)]
pub struct MemoryProductionQueueRepo {
    store: MemoryStore,
}

impl MemoryProductionQueueRepo {
    pub(crate) fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ProductionQueueRepo for MemoryProductionQueueRepo {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<ProductionQueue>> {
        self.store.read(|t| t.queues.get(id).cloned())
    }

    async fn list(
        &self,
        filter: &QueueListFilter,
        page: &Pagination,
    ) -> RepoResult<Page<ProductionQueue>> {
        let mut items: Vec<ProductionQueue> = self.store.read(|t| {
            t.queues
                .values()
                .filter(|q| filter.statuses.is_empty() || filter.statuses.contains(&q.status))
                .filter(|q| {
                    filter.priorities.is_empty() || filter.priorities.contains(&q.priority)
                })
                .cloned()
                .collect()
        })?;
        items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        paginate(items, page)
    }

    async fn insert(&self, queue: &ProductionQueue) -> RepoResult<()> {
        self.store.write(|t| {
            if t.queues.contains_key(&queue.id) {
                return Err(RepoError::Conflict(format!(
                    "production queue {} already exists",
                    queue.id
                )));
            }
            t.queues.insert(queue.id.clone(), queue.clone());
            Ok(())
        })
    }

    async fn update(
        &self,
        queue: &ProductionQueue,
        expected_updated_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        self.store.write(|t| {
            let existing = t
                .queues
                .get_mut(&queue.id)
                .ok_or_else(|| RepoError::NotFound(format!("production queue {}", queue.id)))?;
            check_version(
                "production queue",
                &queue.id,
                existing.updated_at,
                Some(expected_updated_at),
            )?;
            *existing = queue.clone();
            Ok(())
        })
    }

    async fn delete(&self, id: &str) -> RepoResult<()> {
        self.store.write(|t| {
            t.queues
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| RepoError::NotFound(format!("production queue {}", id)))
        })
    }

    async fn has_active_assignments(&self, id: &str) -> RepoResult<bool> {
        self.store.read(|t| {
            let order_assigned = t.orders.values().any(|o| {
                o.production_queue_id.as_deref() == Some(id) && !o.status.is_closed()
            });
            let card_assigned = t
                .cards
                .values()
                .any(|c| c.queue_id == id && c.stage != Stage::Packed);
            order_assigned || card_assigned
        })
    }

    async fn queue_wip_summary(&self, id: &str) -> RepoResult<QueueWipSummary> {
        let now = self.store.now();
        let sla = self.store.sla();
        let cards: Option<Vec<ProductionCard>> = self.store.read(|t| {
            t.queues.get(id).map(|_| {
                t.cards
                    .values()
                    .filter(|c| c.queue_id == id && c.stage != Stage::Packed)
                    .cloned()
                    .collect()
            })
        })?;
        let cards = cards.ok_or_else(|| RepoError::NotFound(format!("production queue {}", id)))?;

        let mut status_counts = BTreeMap::new();
        let mut total_age_ms = 0i64;
        let mut oldest_age_ms = 0i64;
        let mut sla_breach_count = 0i64;
        for card in &cards {
            *status_counts.entry(card.stage.as_str().to_string()).or_insert(0) += 1;
            let age = now - card.created_at;
            let age_ms = age.num_milliseconds();
            total_age_ms += age_ms;
            oldest_age_ms = oldest_age_ms.max(age_ms);
            let breached = match card.due_at {
                Some(due) => due < now,
                None => age > sla,
            };
            if breached {
                sla_breach_count += 1;
            }
        }
        let total = cards.len() as i64;

        Ok(QueueWipSummary {
            queue_id: id.to_string(),
            status_counts,
            total,
            average_age_ms: if total > 0 { total_age_ms / total } else { 0 },
            oldest_age_ms,
            sla_breach_count,
            generated_at: now,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MemoryProductionCardRepo {
    store: MemoryStore,
}

impl MemoryProductionCardRepo {
    pub(crate) fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ProductionCardRepo for MemoryProductionCardRepo {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<ProductionCard>> {
        self.store.read(|t| t.cards.get(id).cloned())
    }

    async fn list_by_queue(&self, queue_id: Option<&str>) -> RepoResult<Vec<ProductionCard>> {
        self.store.read(|t| {
            t.cards
                .values()
                .filter(|c| queue_id.is_none_or(|q| c.queue_id == q))
                .cloned()
                .collect()
        })
    }

    async fn insert(&self, card: &ProductionCard) -> RepoResult<()> {
        self.store.write(|t| {
            if t.cards.contains_key(&card.id) {
                return Err(RepoError::Conflict(format!(
                    "production card {} already exists",
                    card.id
                )));
            }
            t.cards.insert(card.id.clone(), card.clone());
            Ok(())
        })
    }

    async fn update(
        &self,
        card: &ProductionCard,
        expected_updated_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        self.store.write(|t| {
            let existing = t
                .cards
                .get_mut(&card.id)
                .ok_or_else(|| RepoError::NotFound(format!("production card {}", card.id)))?;
            check_version(
                "production card",
                &card.id,
                existing.updated_at,
                Some(expected_updated_at),
            )?;
            *existing = card.clone();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Clock;
    use crate::db::repository::OrderRepo;
    use crate::testing::{FixedClock, sample_card, sample_order, sample_queue};
    use chrono::Duration;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_active_assignments_from_orders_and_cards() {
        let store = MemoryStore::new();
        let queues = store.production_queues();
        queues.insert(&sample_queue("pqu_a")).await.unwrap();
        assert!(!queues.has_active_assignments("pqu_a").await.unwrap());

        let mut order = sample_order("ord_1", 100);
        order.production_queue_id = Some("pqu_a".into());
        store.orders().insert(&order).await.unwrap();
        assert!(queues.has_active_assignments("pqu_a").await.unwrap());
    }

    #[tokio::test]
    async fn test_wip_summary_counts_unpacked_cards() {
        let clock = Arc::new(FixedClock::at_rfc3339("2025-05-10T00:00:00Z"));
        let store = MemoryStore::with_clock(clock.clone()).with_sla_hours(24);
        store.production_queues().insert(&sample_queue("pqu_a")).await.unwrap();

        let cards = store.production_cards();
        let mut old = sample_card("card-1", "pqu_a", Stage::Engraving);
        old.created_at = clock.now() - Duration::hours(48);
        let mut fresh = sample_card("card-2", "pqu_a", Stage::Engraving);
        fresh.created_at = clock.now() - Duration::hours(2);
        let packed = sample_card("card-3", "pqu_a", Stage::Packed);
        for card in [&old, &fresh, &packed] {
            cards.insert(card).await.unwrap();
        }

        let summary = store
            .production_queues()
            .queue_wip_summary("pqu_a")
            .await
            .unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.status_counts.get("engraving"), Some(&2));
        assert_eq!(summary.sla_breach_count, 1);
        assert_eq!(summary.oldest_age_ms, Duration::hours(48).num_milliseconds());
        assert_eq!(summary.average_age_ms, Duration::hours(25).num_milliseconds());
    }
}
