//! 发票批次引擎
//!
//! # 流程
//!
//! ```text
//! IssueInvoicesCommand
//!   │ 校验 + 解析订单（显式 id 或过滤分页）
//!   ▼
//! jobs channel ──▶ worker × min(workers, n) ──▶ results channel (容量 n)
//!                    │ 每单一个 UnitOfWork：
//!                    │   查重 → 发票号 → 渲染 → 存储 → 插入发票 → 回写订单
//!                    ▼
//!              JoinSet 屏障 → 写入唯一的 InvoiceBatchJob → 审计
//! ```
//!
//! 单个订单失败（含取消）只进入失败列表，不影响其他订单。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use shared::models::{
    BatchJobStatus, Invoice, InvoiceBatchFailure, InvoiceBatchFilters, InvoiceBatchJob,
    InvoiceBatchSummary, InvoiceStatus, Metadata, Order, OrderStatus,
};
use shared::util::rfc3339_nano;

use super::adapters::{InvoiceDocumentRenderer, InvoiceStorage, StorageObject};
use super::error::{InvoiceError, InvoiceResult};
use crate::audit::{AuditAction, AuditLogRecord, AuditLogService, NoopAuditLog};
use crate::core::{Clock, IdGenerator, InvoiceSettings};
use crate::counters::CounterService;
use crate::db::{
    InvoiceBatchRepo, InvoiceRepo, OrderListFilter, OrderRepo, Page, Pagination,
    PassThroughUnitOfWork, SortOrder, UnitOfWork, run_in_tx,
};

const PDF_CONTENT_TYPE: &str = "application/pdf";

// ============================================================================
// Command / result
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceOrderFilter {
    #[serde(default)]
    pub statuses: Vec<OrderStatus>,
    #[serde(default)]
    pub placed_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub placed_to: Option<DateTime<Utc>>,
}

impl InvoiceOrderFilter {
    fn is_empty(&self) -> bool {
        self.statuses.is_empty() && self.placed_from.is_none() && self.placed_to.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueInvoicesCommand {
    pub actor_id: String,
    #[serde(default)]
    pub order_ids: Vec<String>,
    #[serde(default)]
    pub filter: InvoiceOrderFilter,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedInvoice {
    pub order_id: String,
    pub invoice_id: String,
    pub invoice_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_asset_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueInvoicesResult {
    pub job_id: String,
    pub issued: Vec<IssuedInvoice>,
    pub summary: InvoiceBatchSummary,
    pub failures: Vec<InvoiceBatchFailure>,
}

// ============================================================================
// Service
// ============================================================================

/// 服务依赖
pub struct InvoiceServiceDeps {
    pub orders: Arc<dyn OrderRepo>,
    pub invoices: Arc<dyn InvoiceRepo>,
    pub batches: Arc<dyn InvoiceBatchRepo>,
    pub counters: Arc<dyn CounterService>,
    pub renderer: Arc<dyn InvoiceDocumentRenderer>,
    pub storage: Arc<dyn InvoiceStorage>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
}

struct Inner {
    orders: Arc<dyn OrderRepo>,
    invoices: Arc<dyn InvoiceRepo>,
    batches: Arc<dyn InvoiceBatchRepo>,
    counters: Arc<dyn CounterService>,
    renderer: Arc<dyn InvoiceDocumentRenderer>,
    storage: Arc<dyn InvoiceStorage>,
    uow: Arc<dyn UnitOfWork>,
    audit: Arc<dyn AuditLogService>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    settings: InvoiceSettings,
}

/// 发票服务（克隆共享同一组依赖）
#[derive(Clone)]
pub struct InvoiceService {
    inner: Arc<Inner>,
}

/// 单个 worker 的产出：(输入位置, 订单 id, 结果)
type WorkResult = (usize, String, InvoiceResult<IssuedInvoice>);

impl InvoiceService {
    pub fn new(deps: InvoiceServiceDeps, settings: InvoiceSettings) -> Self {
        Self::build(deps, settings, Arc::new(PassThroughUnitOfWork), Arc::new(NoopAuditLog))
    }

    pub fn build(
        deps: InvoiceServiceDeps,
        settings: InvoiceSettings,
        uow: Arc<dyn UnitOfWork>,
        audit: Arc<dyn AuditLogService>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                orders: deps.orders,
                invoices: deps.invoices,
                batches: deps.batches,
                counters: deps.counters,
                renderer: deps.renderer,
                storage: deps.storage,
                uow,
                audit,
                clock: deps.clock,
                ids: deps.ids,
                settings,
            }),
        }
    }

    pub async fn issue_invoices(&self, cmd: IssueInvoicesCommand) -> InvoiceResult<IssueInvoicesResult> {
        self.issue_invoices_with_cancel(CancellationToken::new(), cmd)
            .await
    }

    /// 取消后尚未完成的订单记为失败；已提交的发票保留
    pub async fn issue_invoices_with_cancel(
        &self,
        cancel: CancellationToken,
        cmd: IssueInvoicesCommand,
    ) -> InvoiceResult<IssueInvoicesResult> {
        let inner = &self.inner;
        let actor = cmd.actor_id.trim().to_string();
        if actor.is_empty() {
            return Err(InvoiceError::InvalidInput("actor id is required".into()));
        }
        let order_ids = dedupe_ids(&cmd.order_ids);
        if order_ids.is_empty() && cmd.filter.is_empty() {
            return Err(InvoiceError::InvalidInput(
                "order ids or filters are required".into(),
            ));
        }
        if let (Some(from), Some(to)) = (cmd.filter.placed_from, cmd.filter.placed_to)
            && from > to
        {
            return Err(InvoiceError::InvalidInput(
                "placedFrom must not be after placedTo".into(),
            ));
        }
        let notes = shared::util::non_blank(cmd.notes.as_deref());

        // limit 只作用于过滤查询；显式 id 全部加载
        let orders = if order_ids.is_empty() {
            let limit = inner.resolve_limit(cmd.limit);
            inner.list_orders(&cmd.filter, limit).await?
        } else {
            inner.load_orders(&order_ids).await?
        };
        if orders.is_empty() {
            return Err(InvoiceError::InvalidInput("no orders matched filters".into()));
        }

        let started_at = inner.clock.now();
        let job_id = inner.ids.new_id();
        let total = orders.len();
        let input_ids: Vec<String> = orders.iter().map(|o| o.id.clone()).collect();

        let mut results = self
            .run_pool(cancel, &actor, notes.clone(), orders)
            .await;
        results.sort_by_key(|(idx, _, _)| *idx);

        let mut reported = HashSet::new();
        let mut issued = Vec::new();
        let mut failures = Vec::new();
        for (_, order_id, outcome) in results {
            reported.insert(order_id.clone());
            match outcome {
                Ok(invoice) => issued.push(invoice),
                Err(err) => {
                    tracing::warn!(job_id = %job_id, order_id = %order_id, error = %err, "invoice.issue.failed");
                    failures.push(InvoiceBatchFailure {
                        order_id,
                        error: err.to_string(),
                    });
                }
            }
        }
        for order_id in input_ids.iter().filter(|id| !reported.contains(*id)) {
            tracing::warn!(job_id = %job_id, order_id = %order_id, "invoice.issue.failed");
            failures.push(InvoiceBatchFailure {
                order_id: order_id.clone(),
                error: "worker aborted".into(),
            });
        }

        let summary = InvoiceBatchSummary {
            total_orders: total,
            issued: issued.len(),
            failed: failures.len(),
        };
        let job = inner.batch_record(
            &job_id,
            &actor,
            input_ids,
            &cmd.filter,
            summary,
            notes.as_deref(),
            &failures,
            started_at,
        );
        inner.batches.insert(&job).await?;

        tracing::info!(
            job_id = %job_id,
            total = summary.total_orders,
            issued = summary.issued,
            failed = summary.failed,
            "invoice.batch.completed"
        );
        inner.audit_batch(&actor, &job).await;

        Ok(IssueInvoicesResult {
            job_id,
            issued,
            summary,
            failures,
        })
    }

    pub async fn get_batch(&self, id: &str) -> InvoiceResult<InvoiceBatchJob> {
        let id = id.trim();
        self.inner
            .batches
            .find_by_id(id)
            .await?
            .ok_or_else(|| InvoiceError::BatchNotFound(id.to_string()))
    }

    pub async fn list_batches(&self, page: &Pagination) -> InvoiceResult<Page<InvoiceBatchJob>> {
        Ok(self.inner.batches.list(page).await?)
    }

    pub async fn invoices_for_order(&self, order_id: &str) -> InvoiceResult<Vec<Invoice>> {
        Ok(self.inner.invoices.find_by_order_id(order_id.trim()).await?)
    }

    /// 固定 worker 池 + 有界结果通道 + JoinSet 屏障
    async fn run_pool(
        &self,
        cancel: CancellationToken,
        actor: &str,
        notes: Option<String>,
        orders: Vec<Order>,
    ) -> Vec<WorkResult> {
        let total = orders.len();
        let workers = self.inner.settings.workers.max(1).min(total);

        let (job_tx, job_rx) = mpsc::channel::<(usize, Order)>(total);
        for (idx, order) in orders.into_iter().enumerate() {
            // 容量等于订单数，不会阻塞
            if job_tx.send((idx, order)).await.is_err() {
                break;
            }
        }
        drop(job_tx);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<WorkResult>(total);

        let mut set = JoinSet::new();
        for _ in 0..workers {
            let inner = self.inner.clone();
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let cancel = cancel.clone();
            let actor = actor.to_string();
            let notes = notes.clone();
            set.spawn(async move {
                loop {
                    let next = jobs.lock().await.recv().await;
                    let Some((idx, order)) = next else { break };
                    let order_id = order.id.clone();
                    let outcome = if cancel.is_cancelled() {
                        Err(InvoiceError::Canceled)
                    } else {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => Err(InvoiceError::Canceled),
                            r = inner.issue_one(&actor, notes.as_deref(), order) => r,
                        }
                    };
                    if results.send((idx, order_id, outcome)).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Invoice worker aborted");
            }
        }

        let mut out = Vec::with_capacity(total);
        while let Some(result) = result_rx.recv().await {
            out.push(result);
        }
        out
    }
}

impl Inner {
    fn resolve_limit(&self, requested: Option<usize>) -> usize {
        let max = self.settings.max_limit.max(1);
        match requested {
            None | Some(0) => self.settings.default_limit.clamp(1, max),
            Some(n) => n.min(max),
        }
    }

    async fn load_orders(&self, ids: &[String]) -> InvoiceResult<Vec<Order>> {
        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            let order = self
                .orders
                .find_by_id(id)
                .await?
                .ok_or_else(|| InvoiceError::OrderNotFound(id.clone()))?;
            orders.push(order);
        }
        Ok(orders)
    }

    async fn list_orders(
        &self,
        filter: &InvoiceOrderFilter,
        limit: usize,
    ) -> InvoiceResult<Vec<Order>> {
        let list_filter = OrderListFilter {
            statuses: filter.statuses.clone(),
            placed_from: filter.placed_from,
            placed_to: filter.placed_to,
            sort: SortOrder::Asc,
        };
        let mut orders = Vec::new();
        let mut token = None;
        loop {
            let remaining = limit - orders.len();
            let page_size = remaining.min(self.settings.max_limit.max(1));
            let page = self
                .orders
                .list(&list_filter, &Pagination::with_token(page_size, token))
                .await?;
            orders.extend(page.items.into_iter().take(remaining));
            match page.next_page_token {
                Some(next) if orders.len() < limit => token = Some(next),
                _ => break,
            }
        }
        Ok(orders)
    }

    async fn issue_one(
        &self,
        actor: &str,
        notes: Option<&str>,
        order: Order,
    ) -> InvoiceResult<IssuedInvoice> {
        run_in_tx(self.uow.as_ref(), || async {
            let existing = self.invoices.find_by_order_id(&order.id).await?;
            if let Some(invoice) = existing.first() {
                return Err(InvoiceError::Conflict(format!(
                    "order {} already has invoice {}",
                    order.id, invoice.invoice_number
                )));
            }

            let invoice_number = self.counters.next_invoice_number().await?;
            let now = self.clock.now();
            let mut metadata = Metadata::new();
            if let Some(notes) = notes {
                metadata.insert("notes".into(), json!(notes));
            }
            let mut invoice = Invoice {
                id: self.ids.new_id(),
                invoice_number,
                order_ref: format!("/orders/{}", order.id),
                status: InvoiceStatus::Issued,
                amount: order.totals.total,
                currency: order.currency.clone(),
                pdf_asset_ref: None,
                metadata,
                created_at: now,
                updated_at: now,
            };

            let payload = self
                .renderer
                .render_invoice(&order, &invoice)
                .await
                .map_err(|e| InvoiceError::GenerationFailed(e.to_string()))?;

            let object = StorageObject {
                path: format!(
                    "assets/orders/{}/invoices/{}.pdf",
                    order.id, invoice.invoice_number
                ),
                content_type: PDF_CONTENT_TYPE.into(),
                payload,
                metadata: BTreeMap::from([
                    ("invoiceNumber".to_string(), invoice.invoice_number.clone()),
                    ("orderId".to_string(), order.id.clone()),
                ]),
            };
            let asset_ref = self.storage.put(object).await?;
            invoice.pdf_asset_ref = shared::util::non_blank(Some(&asset_ref));

            match self.persist_issued(actor, notes, &order, &invoice, now).await {
                Ok(issued) => Ok(issued),
                Err(err) => {
                    self.discard_asset(&order.id, &asset_ref).await;
                    Err(err)
                }
            }
        })
        .await
    }

    /// 写入发票并回填订单元数据
    async fn persist_issued(
        &self,
        actor: &str,
        notes: Option<&str>,
        order: &Order,
        invoice: &Invoice,
        now: DateTime<Utc>,
    ) -> InvoiceResult<IssuedInvoice> {
        self.invoices.insert(invoice).await?;

        let mut updated = order.clone();
        let meta = &mut updated.metadata;
        meta.insert("invoiceNumber".into(), json!(invoice.invoice_number));
        meta.insert("invoiceStatus".into(), json!(invoice.status.as_str()));
        if let Some(asset) = &invoice.pdf_asset_ref {
            meta.insert("invoiceAssetRef".into(), json!(asset));
        }
        meta.insert("invoiceIssuedAt".into(), json!(rfc3339_nano(&now)));
        if let Some(notes) = notes {
            meta.insert("invoiceNotes".into(), json!(notes));
        }
        updated.updated_at = now;
        updated.audit.updated_by = Some(actor.to_string());
        self.orders.update(&updated, Some(order.updated_at)).await?;

        Ok(IssuedInvoice {
            order_id: order.id.clone(),
            invoice_id: invoice.id.clone(),
            invoice_number: invoice.invoice_number.clone(),
            pdf_asset_ref: invoice.pdf_asset_ref.clone(),
        })
    }

    /// 事务回滚时删除已上传的文件
    async fn discard_asset(&self, order_id: &str, asset_ref: &str) {
        if asset_ref.trim().is_empty() {
            return;
        }
        if let Err(e) = self.storage.delete(asset_ref).await {
            tracing::warn!(order_id = %order_id, asset_ref = %asset_ref, error = %e, "invoice.asset.orphaned");
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn batch_record(
        &self,
        job_id: &str,
        actor: &str,
        order_ids: Vec<String>,
        filter: &InvoiceOrderFilter,
        summary: InvoiceBatchSummary,
        notes: Option<&str>,
        failures: &[InvoiceBatchFailure],
        started_at: DateTime<Utc>,
    ) -> InvoiceBatchJob {
        let mut metadata = Metadata::new();
        if let Some(notes) = notes {
            metadata.insert("notes".into(), json!(notes));
        }
        if !failures.is_empty() {
            let list: Vec<Value> = failures
                .iter()
                .map(|f| json!({"orderId": f.order_id, "error": f.error}))
                .collect();
            metadata.insert("failures".into(), Value::Array(list));
        }
        InvoiceBatchJob {
            id: job_id.to_string(),
            requested_by: actor.to_string(),
            status: if failures.is_empty() {
                BatchJobStatus::Succeeded
            } else {
                BatchJobStatus::Failed
            },
            order_ids,
            filters: InvoiceBatchFilters {
                statuses: filter.statuses.iter().map(|s| s.as_str().to_string()).collect(),
                placed_from: filter.placed_from.as_ref().map(rfc3339_nano),
                placed_to: filter.placed_to.as_ref().map(rfc3339_nano),
            },
            summary,
            metadata,
            created_at: started_at,
            updated_at: self.clock.now(),
        }
    }

    async fn audit_batch(&self, actor: &str, job: &InvoiceBatchJob) {
        let mut metadata = Metadata::new();
        metadata.insert("jobId".into(), json!(job.id));
        metadata.insert("issued".into(), json!(job.summary.issued));
        metadata.insert("failed".into(), json!(job.summary.failed));
        let record = AuditLogRecord::staff(
            actor,
            AuditAction::InvoiceBatchIssue,
            format!("/invoice-batches/{}", job.id),
            self.clock.now(),
        )
        .with_metadata(metadata);
        self.audit.record(record).await;
    }
}

/// Trim、去空、保序去重
fn dedupe_ids(ids: &[String]) -> Vec<String> {
    let mut seen: HashMap<&str, ()> = HashMap::new();
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && seen.insert(id, ()).is_none())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::counters::MemoryCounterService;
    use crate::db::MemoryStore;
    use crate::invoicing::{MemoryInvoiceStorage, TextInvoiceRenderer};
    use crate::testing::{FailingRenderer, FixedClock, SequenceIdGenerator, sample_order};

    struct Fixture {
        store: MemoryStore,
        audit: Arc<MemoryAuditLog>,
        storage: Arc<MemoryInvoiceStorage>,
        service: InvoiceService,
    }

    fn fixture_with(renderer: Arc<dyn InvoiceDocumentRenderer>, workers: usize) -> Fixture {
        fixture_with_ids(renderer, workers, SequenceIdGenerator::new(["job_001"]))
    }

    fn fixture_with_ids(
        renderer: Arc<dyn InvoiceDocumentRenderer>,
        workers: usize,
        ids: SequenceIdGenerator,
    ) -> Fixture {
        let clock = Arc::new(FixedClock::at_rfc3339("2025-05-20T10:00:00Z"));
        let store = MemoryStore::with_clock(clock.clone());
        let audit = Arc::new(MemoryAuditLog::new());
        let storage = Arc::new(MemoryInvoiceStorage::new());
        let deps = InvoiceServiceDeps {
            orders: Arc::new(store.orders()),
            invoices: Arc::new(store.invoices()),
            batches: Arc::new(store.invoice_batches()),
            counters: Arc::new(MemoryCounterService::new(clock.clone())),
            renderer,
            storage: storage.clone(),
            clock,
            ids: Arc::new(ids),
        };
        let settings = InvoiceSettings {
            workers,
            ..Default::default()
        };
        let service = InvoiceService::build(
            deps,
            settings,
            Arc::new(store.unit_of_work()),
            audit.clone(),
        );
        Fixture {
            store,
            audit,
            storage,
            service,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(TextInvoiceRenderer::default()), 5)
    }

    fn command(ids: &[&str]) -> IssueInvoicesCommand {
        IssueInvoicesCommand {
            actor_id: "admin".into(),
            order_ids: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_requires_actor_and_selection() {
        let f = fixture();
        let err = f
            .service
            .issue_invoices(IssueInvoicesCommand::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InvoiceError::InvalidInput(_)));

        let err = f
            .service
            .issue_invoices(IssueInvoicesCommand {
                actor_id: "admin".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, InvoiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_missing_explicit_id_fails_whole_command() {
        let f = fixture();
        f.store.orders().insert(&sample_order("order_1", 100)).await.unwrap();
        let err = f
            .service
            .issue_invoices(command(&["order_1", "order_x"]))
            .await
            .unwrap_err();
        assert_eq!(err, InvoiceError::OrderNotFound("order_x".into()));
        assert!(f.store.invoice_batches().list(&Pagination::first(10)).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_ids_ignore_default_limit() {
        let f = fixture();
        let mut ids: Vec<String> = (0..51).map(|i| format!("order_{i:02}")).collect();
        for id in &ids {
            f.store.orders().insert(&sample_order(id, 100)).await.unwrap();
        }

        // 第 52 个 id 不存在，必须整体失败而不是被截断
        ids.push("order_missing".into());
        let err = f
            .service
            .issue_invoices(IssueInvoicesCommand {
                actor_id: "admin".into(),
                order_ids: ids.clone(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, InvoiceError::OrderNotFound("order_missing".into()));

        ids.pop();
        let result = f
            .service
            .issue_invoices(IssueInvoicesCommand {
                actor_id: "admin".into(),
                order_ids: ids,
                limit: Some(10),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.summary.total_orders, 51);
        assert_eq!(result.summary.issued, 51);
    }

    #[tokio::test]
    async fn test_failed_persist_removes_stored_pdf() {
        let f = fixture_with_ids(
            Arc::new(TextInvoiceRenderer::default()),
            1,
            SequenceIdGenerator::new(["job_001", "inv_taken"]),
        );
        f.store.orders().insert(&sample_order("order_1", 1000)).await.unwrap();
        let now = chrono::Utc::now();
        let taken = Invoice {
            id: "inv_taken".into(),
            invoice_number: "INV-OTHER".into(),
            order_ref: "/orders/order_other".into(),
            status: InvoiceStatus::Issued,
            amount: 500,
            currency: "JPY".into(),
            pdf_asset_ref: None,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        };
        f.store.invoices().insert(&taken).await.unwrap();

        let result = f.service.issue_invoices(command(&["order_1"])).await.unwrap();
        assert_eq!(result.summary.failed, 1);
        assert!(f.storage.is_empty());
        let stored = f.store.orders().find_by_id("order_1").await.unwrap().unwrap();
        assert!(!stored.metadata.contains_key("invoiceNumber"));
    }

    #[tokio::test]
    async fn test_existing_invoice_is_per_order_failure() {
        let f = fixture();
        for id in ["order_1", "order_2"] {
            f.store.orders().insert(&sample_order(id, 1000)).await.unwrap();
        }
        f.service.issue_invoices(command(&["order_1"])).await.unwrap();

        let result = f
            .service
            .issue_invoices(command(&["order_1", "order_2"]))
            .await
            .unwrap();
        assert_eq!(result.summary.total_orders, 2);
        assert_eq!(result.summary.issued, 1);
        assert_eq!(result.summary.failed, 1);
        assert_eq!(result.failures[0].order_id, "order_1");
        assert!(result.failures[0].error.contains("already has invoice"));

        let job = f.service.get_batch(&result.job_id).await.unwrap();
        assert_eq!(job.status, BatchJobStatus::Failed);
        assert_eq!(job.metadata["failures"][0]["orderId"], "order_1");
        assert_eq!(f.storage.len(), 2);
    }

    #[tokio::test]
    async fn test_render_failure_rolls_back_order() {
        let f = fixture_with(Arc::new(FailingRenderer), 2);
        let order = sample_order("order_1", 1000);
        f.store.orders().insert(&order).await.unwrap();

        let result = f.service.issue_invoices(command(&["order_1"])).await.unwrap();
        assert_eq!(result.summary.failed, 1);
        assert!(result.failures[0].error.starts_with("invoice generation failed"));

        let stored = f.store.orders().find_by_id("order_1").await.unwrap().unwrap();
        assert_eq!(stored, order);
        assert!(f.service.invoices_for_order("order_1").await.unwrap().is_empty());
        assert!(f.storage.is_empty());
    }

    #[tokio::test]
    async fn test_filter_listing_respects_limit_and_order() {
        let f = fixture();
        let base = chrono::Utc::now();
        for (i, id) in ["order_c", "order_a", "order_b"].iter().enumerate() {
            let mut order = sample_order(id, 500);
            order.status = OrderStatus::Paid;
            order.created_at = base + chrono::Duration::seconds(i as i64);
            f.store.orders().insert(&order).await.unwrap();
        }
        let result = f
            .service
            .issue_invoices(IssueInvoicesCommand {
                actor_id: "admin".into(),
                filter: InvoiceOrderFilter {
                    statuses: vec![OrderStatus::Paid],
                    ..Default::default()
                },
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<&str> = result.issued.iter().map(|i| i.order_id.as_str()).collect();
        assert_eq!(ids, vec!["order_c", "order_a"]);

        let job = f.service.get_batch(&result.job_id).await.unwrap();
        assert_eq!(job.filters.statuses, vec!["paid"]);
        assert_eq!(f.audit.records()[0].action, AuditAction::InvoiceBatchIssue);
    }

    #[tokio::test]
    async fn test_no_matching_orders() {
        let f = fixture();
        let err = f
            .service
            .issue_invoices(IssueInvoicesCommand {
                actor_id: "admin".into(),
                filter: InvoiceOrderFilter {
                    statuses: vec![OrderStatus::Delivered],
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, InvoiceError::InvalidInput("no orders matched filters".into()));
    }

    #[tokio::test]
    async fn test_cancelled_batch_records_failures() {
        let f = fixture();
        for id in ["order_1", "order_2", "order_3"] {
            f.store.orders().insert(&sample_order(id, 1000)).await.unwrap();
        }
        let token = CancellationToken::new();
        token.cancel();
        let result = f
            .service
            .issue_invoices_with_cancel(token, command(&["order_1", "order_2", "order_3"]))
            .await
            .unwrap();
        assert_eq!(result.summary.issued, 0);
        assert_eq!(result.summary.failed, 3);
        assert!(result.failures.iter().all(|f| f.error == "invoice issuance canceled"));
    }

    #[test]
    fn test_limit_resolution() {
        let f = fixture();
        assert_eq!(f.service.inner.resolve_limit(None), 50);
        assert_eq!(f.service.inner.resolve_limit(Some(0)), 50);
        assert_eq!(f.service.inner.resolve_limit(Some(7)), 7);
        assert_eq!(f.service.inner.resolve_limit(Some(1000)), 200);
    }

    #[test]
    fn test_dedupe_ids() {
        let ids = vec![" a ".to_string(), "b".into(), "a".into(), "".into()];
        assert_eq!(dedupe_ids(&ids), vec!["a", "b"]);
    }
}
