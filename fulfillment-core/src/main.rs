//! fulfillment-worker
//!
//! 从 stdin 读取 NDJSON job 信封，在内存适配器上执行：
//!
//! ```text
//! {"topic":"invoices.issue","data":{"actorId":"admin","orderIds":["ord_1"]}}
//! {"topic":"export.request","data":{"actorId":"admin","entities":["orders"],"idempotencyKey":"idem-1"}}
//! ```
//!
//! stdin 结束后等待所有 worker 排空；Ctrl-C 时不再读取输入，已入队的 job 各处理一次。

use anyhow::Context;
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use fulfillment_core::audit::{AuditService, AuditWorker, MemoryAuditLog};
use fulfillment_core::core::{BackgroundTasks, Clock, Config, SystemClock, TaskKind, UuidIdGenerator};
use fulfillment_core::counters::MemoryCounterService;
use fulfillment_core::db::MemoryStore;
use fulfillment_core::export::{ChannelExportPublisher, EXPORT_TOPIC, ExportService};
use fulfillment_core::invoicing::{
    InvoiceService, InvoiceServiceDeps, InvoiceStorage, LocalInvoiceStorage, MemoryInvoiceStorage,
    TextInvoiceRenderer,
};
use fulfillment_core::jobs::{
    EXPORT_REQUEST_TOPIC, ExportJobProcessor, ExportRequestProcessor, INVOICE_TOPIC,
    InvoiceJobProcessor, JobMessage, JobRouter, JobWorker, TaskStatusExportHandler,
};

/// stdin 上的一行
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<String>,
    topic: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl Envelope {
    fn into_message(self, line_no: usize) -> anyhow::Result<JobMessage> {
        let data = serde_json::to_vec(&self.data).context("encode job data")?;
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("stdin-{line_no}"));
        Ok(JobMessage::new(id, data).with_topic(self.topic))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 加载配置（含 .env）并初始化日志
    let config = Config::load();
    fulfillment_core::init_logger_with_file(
        Some(&config.log_level),
        Some(config.log_json),
        config.log_dir.as_deref(),
    );
    tracing::info!(
        environment = %config.environment,
        production = config.is_production(),
        "🦀 Fulfillment worker starting..."
    );

    // 2. 存储与公共依赖
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = MemoryStore::with_clock(clock.clone()).with_sla_hours(config.queue_sla_hours);
    let mut tasks = BackgroundTasks::new();
    let shutdown = tasks.shutdown_token();

    let audit_log = Arc::new(MemoryAuditLog::new());
    let (audit, audit_rx) = AuditService::new(config.audit_buffer_size);
    let audit_worker = AuditWorker::new(audit_log.clone());
    tasks.spawn("audit_worker", TaskKind::Worker, audit_worker.run(audit_rx));

    let storage: Arc<dyn InvoiceStorage> = match config.invoice_storage_dir.as_deref() {
        Some(dir) => Arc::new(LocalInvoiceStorage::new(dir)),
        None => Arc::new(MemoryInvoiceStorage::new()),
    };

    // 3. 服务
    let invoices = InvoiceService::build(
        InvoiceServiceDeps {
            orders: Arc::new(store.orders()),
            invoices: Arc::new(store.invoices()),
            batches: Arc::new(store.invoice_batches()),
            counters: Arc::new(MemoryCounterService::new(clock.clone())),
            renderer: Arc::new(TextInvoiceRenderer::default()),
            storage,
            clock: clock.clone(),
            ids: Arc::new(UuidIdGenerator),
        },
        config.invoice,
        Arc::new(store.unit_of_work()),
        Arc::new(audit),
    );

    let (export_tx, export_rx) = mpsc::channel(config.job_channel_capacity.max(1));
    let exports = Arc::new(ExportService::new(
        Arc::new(ChannelExportPublisher::new(export_tx)),
        clock.clone(),
    ));
    let export_processor = Arc::new(ExportJobProcessor::new(Arc::new(
        TaskStatusExportHandler::new(exports.clone()),
    )));
    let export_worker = JobWorker::new("export_jobs", export_processor.clone());
    tasks.spawn(
        "export_jobs",
        TaskKind::Worker,
        export_worker.run(export_rx, shutdown.clone()),
    );

    // 4. 入站 job
    let router = JobRouter::new()
        .route(INVOICE_TOPIC, Arc::new(InvoiceJobProcessor::new(invoices)))
        .route(EXPORT_REQUEST_TOPIC, Arc::new(ExportRequestProcessor::new(exports)))
        .route(EXPORT_TOPIC, export_processor);
    tracing::info!(topics = ?router.topics(), "Job routes registered");

    let (job_tx, job_rx) = mpsc::channel(config.job_channel_capacity.max(1));
    // 不交给 BackgroundTasks：export worker 只能在入站排空之后再停
    let inbound_worker = JobWorker::new("inbound_jobs", Arc::new(router));
    let inbound = tokio::spawn(inbound_worker.run(job_rx, shutdown.clone()));

    // 5. 读 stdin 直到 EOF 或 Ctrl-C
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    let interrupted = loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break true,
            line = lines.next_line() => line.context("read stdin")?,
        };
        let Some(line) = line else {
            break false;
        };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let message = match serde_json::from_str::<Envelope>(&line)
            .context("parse job envelope")
            .and_then(|envelope| envelope.into_message(line_no))
        {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(line = line_no, "Skipping malformed input: {e:#}");
                continue;
            }
        };
        if job_tx.send(message).await.is_err() {
            tracing::error!("Inbound job channel closed");
            break false;
        }
    };
    drop(job_tx);

    // 6. 收尾：入站排空 → 取消 export worker（缓冲消息仍投递一次）→ 审计通道随服务释放而关闭
    if interrupted {
        shutdown.cancel();
    }
    if let Err(e) = inbound.await {
        tracing::error!(error = ?e, "Inbound worker join failed");
    }
    tasks.shutdown().await;

    let chain = audit_log.verify_chain();
    tracing::info!(
        lines = line_no,
        audit_records = audit_log.len(),
        audit_chain_ok = chain.is_ok(),
        "Fulfillment worker stopped"
    );
    Ok(())
}
