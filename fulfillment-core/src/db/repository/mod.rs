//! Repository Module
//!
//! 每个聚合由各自的仓储独占。服务层只通过这里定义的 trait 访问存储，
//! 从不接触具体后端。
//!
//! | 端口 | 聚合 | 领域辅助方法 |
//! |------|------|--------------|
//! | [`OrderRepo`] | Order | `list` (状态/下单时间过滤) |
//! | [`PaymentRepo`] | Payment | `list_by_order` |
//! | [`ShipmentRepo`] | Shipment | `list_by_order` |
//! | [`InvoiceRepo`] | Invoice | `find_by_order_id` |
//! | [`InvoiceBatchRepo`] | InvoiceBatchJob | - |
//! | [`ProductionQueueRepo`] | ProductionQueue | `has_active_assignments`, `queue_wip_summary` |
//! | [`ProductionCardRepo`] | ProductionCard | `list_by_queue` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use shared::models::{
    Invoice, InvoiceBatchJob, Order, OrderStatus, Payment, ProductionCard, ProductionQueue,
    QueuePriority, QueueStatus, QueueWipSummary, Shipment,
};

/// Repository error types
///
/// Services translate these through the `is_*` predicates into their own errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness violation or optimistic-lock mismatch
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RepoError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepoError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RepoError::Conflict(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, RepoError::Unavailable(_))
    }
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;

// =============================================================================
// Pagination
// =============================================================================

/// Cursor pagination request; the token is opaque to callers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    pub page_size: usize,
    pub page_token: Option<String>,
}

impl Pagination {
    pub fn first(page_size: usize) -> Self {
        Self {
            page_size,
            page_token: None,
        }
    }

    pub fn with_token(page_size: usize, token: Option<String>) -> Self {
        Self {
            page_size,
            page_token: token
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_page_token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

// =============================================================================
// Filters
// =============================================================================

/// Order listing filter; placed range applies to `created_at` (inclusive)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderListFilter {
    pub statuses: Vec<OrderStatus>,
    pub placed_from: Option<DateTime<Utc>>,
    pub placed_to: Option<DateTime<Utc>>,
    pub sort: SortOrder,
}

impl OrderListFilter {
    pub fn matches(&self, order: &Order) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&order.status) {
            return false;
        }
        if let Some(from) = self.placed_from
            && order.created_at < from
        {
            return false;
        }
        if let Some(to) = self.placed_to
            && order.created_at > to
        {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueListFilter {
    pub statuses: Vec<QueueStatus>,
    pub priorities: Vec<QueuePriority>,
}

// =============================================================================
// Ports
// =============================================================================

#[async_trait]
pub trait OrderRepo: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Order>>;
    async fn list(&self, filter: &OrderListFilter, page: &Pagination) -> RepoResult<Page<Order>>;
    async fn insert(&self, order: &Order) -> RepoResult<()>;
    /// Optimistic when `expected_updated_at` is set
    async fn update(
        &self,
        order: &Order,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> RepoResult<()>;
}

#[async_trait]
pub trait PaymentRepo: Send + Sync {
    async fn find_by_id(&self, order_id: &str, payment_id: &str) -> RepoResult<Option<Payment>>;
    async fn list_by_order(&self, order_id: &str) -> RepoResult<Vec<Payment>>;
    async fn insert(&self, payment: &Payment) -> RepoResult<()>;
    async fn update(
        &self,
        payment: &Payment,
        expected_updated_at: Option<DateTime<Utc>>,
    ) -> RepoResult<()>;
}

#[async_trait]
pub trait ShipmentRepo: Send + Sync {
    async fn find_by_id(&self, order_id: &str, shipment_id: &str)
    -> RepoResult<Option<Shipment>>;
    async fn list_by_order(&self, order_id: &str) -> RepoResult<Vec<Shipment>>;
    async fn insert(&self, shipment: &Shipment) -> RepoResult<()>;
}

#[async_trait]
pub trait InvoiceRepo: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Invoice>>;
    async fn find_by_order_id(&self, order_id: &str) -> RepoResult<Vec<Invoice>>;
    /// Conflict when the order already has an invoice
    async fn insert(&self, invoice: &Invoice) -> RepoResult<()>;
}

#[async_trait]
pub trait InvoiceBatchRepo: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<InvoiceBatchJob>>;
    async fn list(&self, page: &Pagination) -> RepoResult<Page<InvoiceBatchJob>>;
    async fn insert(&self, job: &InvoiceBatchJob) -> RepoResult<()>;
}

#[async_trait]
pub trait ProductionQueueRepo: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<ProductionQueue>>;
    async fn list(
        &self,
        filter: &QueueListFilter,
        page: &Pagination,
    ) -> RepoResult<Page<ProductionQueue>>;
    async fn insert(&self, queue: &ProductionQueue) -> RepoResult<()>;
    async fn update(
        &self,
        queue: &ProductionQueue,
        expected_updated_at: DateTime<Utc>,
    ) -> RepoResult<()>;
    async fn delete(&self, id: &str) -> RepoResult<()>;
    /// Any open order or unpacked card still references the queue
    async fn has_active_assignments(&self, id: &str) -> RepoResult<bool>;
    /// Raw WIP aggregation; the service normalizes it
    async fn queue_wip_summary(&self, id: &str) -> RepoResult<QueueWipSummary>;
}

#[async_trait]
pub trait ProductionCardRepo: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<ProductionCard>>;
    async fn list_by_queue(&self, queue_id: Option<&str>) -> RepoResult<Vec<ProductionCard>>;
    async fn insert(&self, card: &ProductionCard) -> RepoResult<()>;
    async fn update(
        &self,
        card: &ProductionCard,
        expected_updated_at: DateTime<Utc>,
    ) -> RepoResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_error_predicates() {
        assert!(RepoError::NotFound("x".into()).is_not_found());
        assert!(RepoError::Conflict("x".into()).is_conflict());
        assert!(RepoError::Unavailable("x".into()).is_unavailable());
        assert!(!RepoError::Internal("x".into()).is_unavailable());
    }

    #[test]
    fn test_pagination_trims_token() {
        let page = Pagination::with_token(10, Some("  20 ".into()));
        assert_eq!(page.page_token.as_deref(), Some("20"));
        assert_eq!(Pagination::with_token(10, Some("  ".into())).page_token, None);
    }
}
