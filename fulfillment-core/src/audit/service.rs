//! 审计日志通道前端
//!
//! 服务层调用 `record`，记录经 mpsc 通道交给 [`AuditWorker`](super::AuditWorker)
//! 写入实际存储。通道满或已关闭时丢弃并记录警告，不影响业务。

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::AuditLogService;
use super::types::AuditLogRecord;

#[derive(Debug, Clone)]
pub struct AuditService {
    tx: mpsc::Sender<AuditLogRecord>,
}

impl AuditService {
    /// 创建服务及其接收端（交给 AuditWorker::run）
    pub fn new(buffer_size: usize) -> (Self, mpsc::Receiver<AuditLogRecord>) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl AuditLogService for AuditService {
    async fn record(&self, record: AuditLogRecord) {
        let action = record.action;
        if let Err(e) = self.tx.try_send(record) {
            tracing::warn!(action = %action, error = %e, "Audit record dropped");
        }
    }
}
