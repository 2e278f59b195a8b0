//! 审计日志后台 Worker
//!
//! 从 mpsc 通道消费 AuditLogRecord，写入下游存储。
//! 通道关闭时自动退出。

use std::sync::Arc;

use tokio::sync::mpsc;

use super::AuditLogService;
use super::types::AuditLogRecord;

pub struct AuditWorker {
    sink: Arc<dyn AuditLogService>,
}

impl AuditWorker {
    pub fn new(sink: Arc<dyn AuditLogService>) -> Self {
        Self { sink }
    }

    /// 运行 worker（阻塞直到通道关闭）
    pub async fn run(self, mut rx: mpsc::Receiver<AuditLogRecord>) {
        tracing::info!("📋 Audit log worker started");

        while let Some(record) = rx.recv().await {
            self.sink.record(record).await;
        }

        tracing::info!("Audit log channel closed, worker stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditAction, AuditService, MemoryAuditLog};
    use chrono::Utc;

    #[tokio::test]
    async fn test_worker_drains_channel_into_sink() {
        let sink = Arc::new(MemoryAuditLog::new());
        let (service, rx) = AuditService::new(8);
        let handle = tokio::spawn(AuditWorker::new(sink.clone()).run(rx));

        for i in 0..3 {
            service
                .record(AuditLogRecord::staff(
                    format!("staff-{i}"),
                    AuditAction::ProductionCardEvent,
                    "/production-cards/c1",
                    Utc::now(),
                ))
                .await;
        }
        drop(service);
        handle.await.unwrap();

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.verify_chain(), Ok(()));
    }
}
