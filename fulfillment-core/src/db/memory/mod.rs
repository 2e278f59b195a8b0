//! 内存存储
//!
//! 所有仓储端口的内存实现，共享一个 `Tables` 快照结构：
//!
//! ```text
//! MemoryStore ──┬── orders()            → MemoryOrderRepo
//!               ├── payments()          → MemoryPaymentRepo
//!               ├── shipments()         → MemoryShipmentRepo
//!               ├── invoices()          → MemoryInvoiceRepo
//!               ├── invoice_batches()   → MemoryInvoiceBatchRepo
//!               ├── production_queues() → MemoryProductionQueueRepo
//!               ├── production_cards()  → MemoryProductionCardRepo
//!               └── unit_of_work()      → MemoryUnitOfWork (串行化 + undo 日志)
//! ```
//!
//! 事务之间由异步锁串行化。事务内的写入按行记录首次修改前的值，
//! 回滚只恢复这些行；事务外（其他任务）的写入不会被覆盖。

mod invoices;
mod orders;
mod payments;
mod production;
mod shipments;

pub use invoices::{MemoryInvoiceBatchRepo, MemoryInvoiceRepo};
pub use orders::MemoryOrderRepo;
pub use payments::MemoryPaymentRepo;
pub use production::{MemoryProductionCardRepo, MemoryProductionQueueRepo};
pub use shipments::MemoryShipmentRepo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use shared::models::{
    Invoice, InvoiceBatchJob, Order, Payment, ProductionCard, ProductionQueue, Shipment,
};

use super::repository::{Page, Pagination, RepoError, RepoResult};
use super::unit_of_work::{Transaction, TxScope, UnitOfWork};
use crate::core::{Clock, SystemClock};

#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    pub orders: BTreeMap<String, Order>,
    pub payments: BTreeMap<String, Payment>,
    pub shipments: BTreeMap<String, Shipment>,
    pub invoices: BTreeMap<String, Invoice>,
    pub invoice_batches: BTreeMap<String, InvoiceBatchJob>,
    pub queues: BTreeMap<String, ProductionQueue>,
    pub cards: BTreeMap<String, ProductionCard>,
}

/// 内存存储（克隆共享同一份数据）
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    tx_lock: Arc<Mutex<()>>,
    unavailable: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    sla: chrono::Duration,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("sla", &self.sla)
            .finish_non_exhaustive()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// WIP 年龄和 SLA 计算使用注入时钟
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            tx_lock: Arc::new(Mutex::new(())),
            unavailable: Arc::new(AtomicBool::new(false)),
            clock,
            sla: chrono::Duration::hours(72),
        }
    }

    /// 无交期卡片超过该时长计为 SLA 违约
    pub fn with_sla_hours(mut self, hours: i64) -> Self {
        self.sla = chrono::Duration::hours(hours.max(0));
        self
    }

    /// 模拟后端不可用（所有操作返回 `RepoError::Unavailable`）
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn orders(&self) -> MemoryOrderRepo {
        MemoryOrderRepo::new(self.clone())
    }

    pub fn payments(&self) -> MemoryPaymentRepo {
        MemoryPaymentRepo::new(self.clone())
    }

    pub fn shipments(&self) -> MemoryShipmentRepo {
        MemoryShipmentRepo::new(self.clone())
    }

    pub fn invoices(&self) -> MemoryInvoiceRepo {
        MemoryInvoiceRepo::new(self.clone())
    }

    pub fn invoice_batches(&self) -> MemoryInvoiceBatchRepo {
        MemoryInvoiceBatchRepo::new(self.clone())
    }

    pub fn production_queues(&self) -> MemoryProductionQueueRepo {
        MemoryProductionQueueRepo::new(self.clone())
    }

    pub fn production_cards(&self) -> MemoryProductionCardRepo {
        MemoryProductionCardRepo::new(self.clone())
    }

    pub fn unit_of_work(&self) -> MemoryUnitOfWork {
        MemoryUnitOfWork {
            store: self.clone(),
        }
    }

    // ---- crate-internal access ----

    pub(crate) fn check_available(&self) -> RepoResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepoError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> RepoResult<R> {
        self.check_available()?;
        Ok(f(&self.tables.read()))
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Tables) -> RepoResult<R>) -> RepoResult<R> {
        self.check_available()?;
        let Some(tx) = self.active_tx() else {
            return f(&mut self.tables.write());
        };
        let mut tables = self.tables.write();
        let before = tables.clone();
        let result = f(&mut tables);
        tx.undo.lock().record(&before, &tables);
        result
    }

    /// 当前任务在本存储上开启的事务
    fn active_tx(&self) -> Option<Arc<TxState>> {
        TxScope::current()
            .and_then(|scope| scope.downcast::<TxState>())
            .filter(|tx| Arc::ptr_eq(&tx.tables, &self.tables))
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn sla(&self) -> chrono::Duration {
        self.sla
    }
}

/// 乐观锁检查
pub(crate) fn check_version(
    kind: &str,
    id: &str,
    current: DateTime<Utc>,
    expected: Option<DateTime<Utc>>,
) -> RepoResult<()> {
    match expected {
        Some(expected) if expected != current => Err(RepoError::Conflict(format!(
            "{} {} was modified concurrently",
            kind, id
        ))),
        _ => Ok(()),
    }
}

/// Offset 分页；token 为下一页起始下标
pub(crate) fn paginate<T>(items: Vec<T>, page: &Pagination) -> RepoResult<Page<T>> {
    let offset = match page.page_token.as_deref() {
        None => 0,
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| RepoError::Validation(format!("invalid page token: {}", token)))?,
    };
    let total = items.len();
    let size = if page.page_size == 0 {
        total.max(1)
    } else {
        page.page_size
    };
    let end = offset.saturating_add(size).min(total);
    let next_page_token = (end < total).then(|| end.to_string());
    let items = items.into_iter().skip(offset).take(size).collect();
    Ok(Page {
        items,
        next_page_token,
    })
}

// =============================================================================
// Unit of Work
// =============================================================================

#[derive(Clone)]
pub struct MemoryUnitOfWork {
    store: MemoryStore,
}

// ---- undo log ----

/// 行级 undo：key → 首次修改前的值（`None` 表示此前不存在）
type Undo<V> = BTreeMap<String, Option<V>>;

#[derive(Default)]
struct UndoLog {
    orders: Undo<Order>,
    payments: Undo<Payment>,
    shipments: Undo<Shipment>,
    invoices: Undo<Invoice>,
    invoice_batches: Undo<InvoiceBatchJob>,
    queues: Undo<ProductionQueue>,
    cards: Undo<ProductionCard>,
}

fn record_changes<V: Clone + PartialEq>(
    undo: &mut Undo<V>,
    before: &BTreeMap<String, V>,
    after: &BTreeMap<String, V>,
) {
    let keys = before.keys().chain(after.keys());
    for key in keys {
        if undo.contains_key(key) || before.get(key) == after.get(key) {
            continue;
        }
        undo.insert(key.clone(), before.get(key).cloned());
    }
}

fn restore<V>(table: &mut BTreeMap<String, V>, undo: Undo<V>) {
    for (key, prior) in undo {
        match prior {
            Some(value) => {
                table.insert(key, value);
            }
            None => {
                table.remove(&key);
            }
        }
    }
}

impl UndoLog {
    fn record(&mut self, before: &Tables, after: &Tables) {
        record_changes(&mut self.orders, &before.orders, &after.orders);
        record_changes(&mut self.payments, &before.payments, &after.payments);
        record_changes(&mut self.shipments, &before.shipments, &after.shipments);
        record_changes(&mut self.invoices, &before.invoices, &after.invoices);
        record_changes(
            &mut self.invoice_batches,
            &before.invoice_batches,
            &after.invoice_batches,
        );
        record_changes(&mut self.queues, &before.queues, &after.queues);
        record_changes(&mut self.cards, &before.cards, &after.cards);
    }

    fn len(&self) -> usize {
        self.orders.len()
            + self.payments.len()
            + self.shipments.len()
            + self.invoices.len()
            + self.invoice_batches.len()
            + self.queues.len()
            + self.cards.len()
    }

    fn apply(self, tables: &mut Tables) {
        restore(&mut tables.orders, self.orders);
        restore(&mut tables.payments, self.payments);
        restore(&mut tables.shipments, self.shipments);
        restore(&mut tables.invoices, self.invoices);
        restore(&mut tables.invoice_batches, self.invoice_batches);
        restore(&mut tables.queues, self.queues);
        restore(&mut tables.cards, self.cards);
    }
}

/// 事务状态，经 [`TxScope`] 挂在执行事务的任务上
struct TxState {
    tables: Arc<RwLock<Tables>>,
    undo: parking_lot::Mutex<UndoLog>,
}

struct MemoryTransaction {
    state: Arc<TxState>,
    committed: bool,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        // 未提交即被丢弃（错误或取消）时回滚
        if self.committed {
            return;
        }
        let undo = std::mem::take(&mut *self.state.undo.lock());
        if undo.len() > 0 {
            debug!(rows = undo.len(), "memory transaction rolled back");
        }
        undo.apply(&mut self.state.tables.write());
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(mut self: Box<Self>) -> RepoResult<()> {
        self.committed = true;
        Ok(())
    }

    async fn rollback(self: Box<Self>) {
        drop(self);
    }

    fn scope(&self) -> Option<TxScope> {
        Some(TxScope::new(self.state.clone()))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn begin(&self) -> RepoResult<Box<dyn Transaction>> {
        self.store.check_available()?;
        let guard = self.store.tx_lock.clone().lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            state: Arc::new(TxState {
                tables: self.store.tables.clone(),
                undo: parking_lot::Mutex::new(UndoLog::default()),
            }),
            committed: false,
            _guard: guard,
        }))
    }
}
