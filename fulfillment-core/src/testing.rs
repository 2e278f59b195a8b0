//! 测试辅助
//!
//! 固定时钟、预设 ID 序列、外部端口的桩实现，以及把 [`MemoryStore`]
//! 和各服务连起来的 [`TestHarness`]。单元测试和 `tests/` 下的集成测试共用。

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use shared::models::{
    CardPriority, Invoice, Metadata, Order, OrderAudit, OrderEvent, OrderLineItem, OrderStatus,
    OrderTotals, Payment, ProductionCard, ProductionQueue, QueuePriority, QueueStatus, Stage,
    payment_status,
};

use crate::audit::MemoryAuditLog;
use crate::core::{Clock, IdGenerator, InvoiceSettings};
use crate::counters::MemoryCounterService;
use crate::db::{MemoryStore, OrderRepo, PaymentRepo};
use crate::events::{EventError, EventPublisher};
use crate::export::{
    BigQueryExportMessage, ExportJobPublisher, ExportService, NoopExportPublisher, PublishError,
};
use crate::invoicing::{
    InvoiceDocumentRenderer, InvoiceService, InvoiceServiceDeps, MemoryInvoiceStorage,
    RenderError, TextInvoiceRenderer,
};
use crate::payments::{
    CaptureRequest, PaymentContext, PaymentDetails, PaymentProcessor, PaymentService,
    ProcessorError, RefundRequest,
};
use crate::production::{ProductionBoardService, ProductionQueueService};
use crate::shipments::{
    LabelError, ShipmentService, ShippingLabel, ShippingLabelProvider, ShippingLabelRequest,
};

// ============================================================================
// Clock / IDs
// ============================================================================

/// 可手动推进的时钟
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Panics on a malformed timestamp
    pub fn at_rfc3339(value: &str) -> Self {
        let now = DateTime::parse_from_rfc3339(value)
            .unwrap_or_else(|e| panic!("invalid fixed clock timestamp {value}: {e}"));
        Self::new(now.with_timezone(&Utc))
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// 按预设顺序返回 ID，用完后退回随机 ID
#[derive(Debug, Default)]
pub struct SequenceIdGenerator {
    queue: Mutex<VecDeque<String>>,
}

impl SequenceIdGenerator {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: Mutex::new(ids.into_iter().map(Into::into).collect()),
        }
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn new_id(&self) -> String {
        self.queue
            .lock()
            .pop_front()
            .unwrap_or_else(shared::util::opaque_id)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// 待支付 JPY 订单，单行 `SKU-1 x1`
pub fn sample_order(id: &str, total: i64) -> Order {
    let now = Utc::now();
    Order {
        id: id.to_string(),
        order_number: format!("HF-{}", id.to_ascii_uppercase()),
        status: OrderStatus::PendingPayment,
        currency: "JPY".into(),
        totals: OrderTotals {
            subtotal: total,
            total,
            ..Default::default()
        },
        items: vec![OrderLineItem {
            sku: "SKU-1".into(),
            name: Some("柘植 実印".into()),
            quantity: 1,
            unit_price: total,
        }],
        production_queue_id: None,
        paid_at: None,
        shipped_at: None,
        metadata: Metadata::new(),
        audit: OrderAudit::default(),
        created_at: now,
        updated_at: now,
    }
}

/// Stripe 授权待捕获，intent 为 `pi_<id>`
pub fn sample_payment(id: &str, order_id: &str, amount: i64) -> Payment {
    let now = Utc::now();
    Payment {
        id: id.to_string(),
        order_id: order_id.to_string(),
        provider: "stripe".into(),
        intent_id: format!("pi_{id}"),
        status: payment_status::REQUIRES_CAPTURE.into(),
        amount,
        currency: "JPY".into(),
        captured: false,
        captured_at: None,
        refunded_at: None,
        raw: Metadata::new(),
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_queue(id: &str) -> ProductionQueue {
    let now = Utc::now();
    ProductionQueue {
        id: id.to_string(),
        name: format!("queue {id}"),
        capacity: 10,
        work_centers: vec!["laser".into()],
        priority: QueuePriority::Normal,
        status: QueueStatus::Active,
        notes: String::new(),
        metadata: Metadata::new(),
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_card(id: &str, queue_id: &str, stage: Stage) -> ProductionCard {
    let now = Utc::now();
    ProductionCard {
        id: id.to_string(),
        order_id: format!("ord-{id}"),
        order_number: format!("HF-{id}"),
        stage,
        priority: CardPriority::Normal,
        queue_id: queue_id.to_string(),
        workstation: String::new(),
        flags: Vec::new(),
        due_at: None,
        notes: Vec::new(),
        blocked: false,
        blocked_reason: None,
        last_event: None,
        timeline: Vec::new(),
        inspection: None,
        created_at: now,
        updated_at: now,
    }
}

// ============================================================================
// Port stubs
// ============================================================================

/// 总是失败的渲染器
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingRenderer;

#[async_trait]
impl InvoiceDocumentRenderer for FailingRenderer {
    async fn render_invoice(&self, _order: &Order, _invoice: &Invoice) -> Result<Vec<u8>, RenderError> {
        Err(RenderError::Unavailable("renderer offline".into()))
    }
}

/// 渲染时先发出 `started`，等到 [`GatedRenderer::release`] 后再失败
#[derive(Debug, Default)]
pub struct GatedRenderer {
    started: tokio::sync::Notify,
    release: tokio::sync::Notify,
}

impl GatedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 等待某次渲染进入事务
    pub async fn started(&self) {
        self.started.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl InvoiceDocumentRenderer for GatedRenderer {
    async fn render_invoice(&self, _order: &Order, _invoice: &Invoice) -> Result<Vec<u8>, RenderError> {
        self.started.notify_one();
        self.release.notified().await;
        Err(RenderError::Unavailable("renderer released".into()))
    }
}

/// 按脚本应答的支付处理器；未配置应答时返回 `Unavailable`
#[derive(Debug, Default)]
pub struct StubPaymentProcessor {
    capture_responses: Mutex<VecDeque<Result<PaymentDetails, ProcessorError>>>,
    refund_responses: Mutex<VecDeque<Result<PaymentDetails, ProcessorError>>>,
    captures: Mutex<Vec<(PaymentContext, CaptureRequest)>>,
    refunds: Mutex<Vec<(PaymentContext, RefundRequest)>>,
}

impl StubPaymentProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_capture(&self, response: Result<PaymentDetails, ProcessorError>) {
        self.capture_responses.lock().push_back(response);
    }

    pub fn respond_refund(&self, response: Result<PaymentDetails, ProcessorError>) {
        self.refund_responses.lock().push_back(response);
    }

    pub fn captures(&self) -> Vec<(PaymentContext, CaptureRequest)> {
        self.captures.lock().clone()
    }

    pub fn refunds(&self) -> Vec<(PaymentContext, RefundRequest)> {
        self.refunds.lock().clone()
    }
}

#[async_trait]
impl PaymentProcessor for StubPaymentProcessor {
    async fn capture(
        &self,
        ctx: &PaymentContext,
        req: CaptureRequest,
    ) -> Result<PaymentDetails, ProcessorError> {
        self.captures.lock().push((ctx.clone(), req));
        self.capture_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ProcessorError::Unavailable("no capture response".into())))
    }

    async fn refund(
        &self,
        ctx: &PaymentContext,
        req: RefundRequest,
    ) -> Result<PaymentDetails, ProcessorError> {
        self.refunds.lock().push((ctx.clone(), req));
        self.refund_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ProcessorError::Unavailable("no refund response".into())))
    }
}

/// 面单桩：默认返回空面单
#[derive(Debug, Default)]
pub struct StubLabelProvider {
    response: Option<Result<ShippingLabel, LabelError>>,
    requests: Mutex<Vec<ShippingLabelRequest>>,
}

impl StubLabelProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(label: ShippingLabel) -> Self {
        Self {
            response: Some(Ok(label)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: LabelError) -> Self {
        Self {
            response: Some(Err(err)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ShippingLabelRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ShippingLabelProvider for StubLabelProvider {
    async fn create_shipping_label(
        &self,
        req: ShippingLabelRequest,
    ) -> Result<ShippingLabel, LabelError> {
        self.requests.lock().push(req);
        self.response
            .clone()
            .unwrap_or_else(|| Ok(ShippingLabel::default()))
    }
}

/// 记录已发布的订单事件
#[derive(Debug, Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<OrderEvent>>,
    fail: bool,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every publish fails after being recorded
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<OrderEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish_order_event(&self, event: OrderEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        if self.fail {
            return Err(EventError::Failed("broker rejected event".into()));
        }
        Ok(())
    }
}

/// 发布总是失败的导出端口
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingExportPublisher;

#[async_trait]
impl ExportJobPublisher for FailingExportPublisher {
    async fn publish_bigquery_export(
        &self,
        _message: BigQueryExportMessage,
    ) -> Result<String, PublishError> {
        Err(PublishError::Failed("pubsub unavailable".into()))
    }
}

// ============================================================================
// Harness
// ============================================================================

/// 共享一个 [`MemoryStore`] 和固定时钟的服务装配
pub struct TestHarness {
    pub clock: Arc<FixedClock>,
    pub store: MemoryStore,
    pub audit: Arc<MemoryAuditLog>,
    pub storage: Arc<MemoryInvoiceStorage>,
    pub events: Arc<RecordingEventPublisher>,
    pub processor: Arc<StubPaymentProcessor>,
    pub labels: Arc<StubLabelProvider>,
    pub exports: Arc<NoopExportPublisher>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self::at("2025-05-20T10:00:00Z")
    }

    pub fn at(rfc3339: &str) -> Self {
        Self::with_labels(rfc3339, StubLabelProvider::new())
    }

    pub fn with_labels(rfc3339: &str, labels: StubLabelProvider) -> Self {
        let clock = Arc::new(FixedClock::at_rfc3339(rfc3339));
        Self {
            store: MemoryStore::with_clock(clock.clone()),
            clock,
            audit: Arc::new(MemoryAuditLog::new()),
            storage: Arc::new(MemoryInvoiceStorage::new()),
            events: Arc::new(RecordingEventPublisher::new()),
            processor: Arc::new(StubPaymentProcessor::new()),
            labels: Arc::new(labels),
            exports: Arc::new(NoopExportPublisher::new()),
        }
    }

    /// Panics if the order id is already taken
    pub async fn seed_order(&self, order: Order) {
        if let Err(e) = self.store.orders().insert(&order).await {
            panic!("seed order {}: {e}", order.id);
        }
    }

    pub async fn seed_payment(&self, payment: Payment) {
        if let Err(e) = self.store.payments().insert(&payment).await {
            panic!("seed payment {}: {e}", payment.id);
        }
    }

    pub async fn order(&self, id: &str) -> Option<Order> {
        self.store.orders().find_by_id(id).await.ok().flatten()
    }

    pub async fn payment(&self, order_id: &str, payment_id: &str) -> Option<Payment> {
        self.store
            .payments()
            .find_by_id(order_id, payment_id)
            .await
            .ok()
            .flatten()
    }

    pub fn invoice_service(&self) -> InvoiceService {
        self.invoice_service_with(
            Arc::new(TextInvoiceRenderer::default()),
            SequenceIdGenerator::new(Vec::<String>::new()),
            InvoiceSettings::default(),
        )
    }

    pub fn invoice_service_with(
        &self,
        renderer: Arc<dyn InvoiceDocumentRenderer>,
        ids: SequenceIdGenerator,
        settings: InvoiceSettings,
    ) -> InvoiceService {
        let deps = InvoiceServiceDeps {
            orders: Arc::new(self.store.orders()),
            invoices: Arc::new(self.store.invoices()),
            batches: Arc::new(self.store.invoice_batches()),
            counters: Arc::new(MemoryCounterService::new(self.clock.clone())),
            renderer,
            storage: self.storage.clone(),
            clock: self.clock.clone(),
            ids: Arc::new(ids),
        };
        InvoiceService::build(
            deps,
            settings,
            Arc::new(self.store.unit_of_work()),
            self.audit.clone(),
        )
    }

    pub fn payment_service(&self) -> PaymentService {
        PaymentService::new(
            Arc::new(self.store.orders()),
            Arc::new(self.store.payments()),
            self.processor.clone(),
            self.clock.clone(),
        )
        .with_unit_of_work(Arc::new(self.store.unit_of_work()))
        .with_audit(self.audit.clone())
    }

    pub fn shipment_service(&self, ids: SequenceIdGenerator) -> ShipmentService {
        ShipmentService::new(
            Arc::new(self.store.orders()),
            Arc::new(self.store.shipments()),
            self.clock.clone(),
            Arc::new(ids),
        )
        .with_label_provider(self.labels.clone())
        .with_events(self.events.clone())
        .with_unit_of_work(Arc::new(self.store.unit_of_work()))
    }

    pub fn export_service(&self, ids: SequenceIdGenerator) -> ExportService {
        ExportService::with_id_generator(self.exports.clone(), self.clock.clone(), Arc::new(ids))
    }

    pub fn queue_service(&self, ids: SequenceIdGenerator) -> ProductionQueueService {
        ProductionQueueService::new(
            Arc::new(self.store.production_queues()),
            self.clock.clone(),
            Arc::new(ids),
        )
        .with_unit_of_work(Arc::new(self.store.unit_of_work()))
        .with_audit(self.audit.clone())
    }

    pub fn board_service(&self) -> ProductionBoardService {
        ProductionBoardService::new(Arc::new(self.store.production_cards()), self.clock.clone())
            .with_unit_of_work(Arc::new(self.store.unit_of_work()))
            .with_audit(self.audit.clone())
    }
}
