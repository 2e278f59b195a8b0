//! 审计日志模块
//!
//! # 架构
//!
//! ```text
//! 服务 (queue/board/payments/invoices)
//!     │ record(AuditLogRecord)
//!     ▼
//! AuditLogService (trait)
//!     ├── MemoryAuditLog   直接追加（SHA256 哈希链）
//!     └── AuditService     mpsc 通道 ─▶ AuditWorker ─▶ 任意 AuditLogService
//! ```
//!
//! # 设计原则
//!
//! - **Append-only**：存储没有删除/更新接口
//! - **哈希链**：每条记录包含上一条的哈希，`verify_chain` 检测篡改
//! - **不阻塞业务**：`record` 不返回错误，写入失败只记录日志

pub mod diff;
pub mod service;
pub mod storage;
pub mod types;
pub mod worker;

pub use diff::{diff_fields, push_change, values_equal};
pub use service::AuditService;
pub use storage::MemoryAuditLog;
pub use types::*;
pub use worker::AuditWorker;

use async_trait::async_trait;

/// 审计记录端口
#[async_trait]
pub trait AuditLogService: Send + Sync {
    async fn record(&self, record: AuditLogRecord);
}

/// 不记录任何内容
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditLog;

#[async_trait]
impl AuditLogService for NoopAuditLog {
    async fn record(&self, _record: AuditLogRecord) {}
}
