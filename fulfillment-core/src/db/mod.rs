//! 持久化层
//!
//! - [`repository`] - 仓储端口（trait）与通用错误/分页类型
//! - [`unit_of_work`] - 事务作用域
//! - [`memory`] - 内存实现（测试与本地 worker 使用）

pub mod memory;
pub mod repository;
pub mod unit_of_work;

pub use memory::MemoryStore;
pub use repository::{
    InvoiceBatchRepo, InvoiceRepo, OrderListFilter, OrderRepo, Page, Pagination, PaymentRepo,
    ProductionCardRepo, ProductionQueueRepo, QueueListFilter, RepoError, RepoResult, ShipmentRepo,
    SortOrder,
};
pub use unit_of_work::{PassThroughUnitOfWork, Transaction, TxScope, UnitOfWork, run_in_tx};
