//! 支付结算服务
//!
//! ```text
//! webhook ─┐                       ┌─▶ PaymentRepo::update (乐观锁)
//!          ├─▶ 计算新的 Payment ────┤
//! manual ──┘   (处理器 / 事件)       └─▶ 重新列出订单全部支付 → 汇总 → OrderRepo::update
//!                                        └───────── 同一个 UnitOfWork ─────────┘
//! ```
//!
//! 订单汇总每次都从全部支付重新计算，并发 webhook 不会丢失更新。

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

use shared::models::{Metadata, Order, OrderStatus, Payment, PaymentSummary};
use shared::util::rfc3339_nano;

use super::amounts::{captured_amount, refundable_amount, refunded_amount};
use super::error::{PaymentError, PaymentResult, processor_failure};
use super::processor::{
    CaptureRequest, PaymentContext, PaymentProcessor, RefundRequest, apply_payment_details,
};
use super::webhook::{PROVIDER_STRIPE, PaymentWebhookCommand, WebhookEvent, parse_event};
use crate::audit::{AuditAction, AuditLogRecord, AuditLogService, NoopAuditLog, push_change};
use crate::core::Clock;
use crate::db::{OrderRepo, PassThroughUnitOfWork, PaymentRepo, UnitOfWork, run_in_tx};

const ACTION_CAPTURE: &str = "manual_capture";
const ACTION_REFUND: &str = "manual_refund";

/// 手动请款/退款命令
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualPaymentCommand {
    pub order_id: String,
    pub payment_id: String,
    pub actor_id: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// 校验后的标识
struct ManualTarget {
    order_id: String,
    payment_id: String,
    actor_id: String,
}

impl ManualPaymentCommand {
    fn validate(&self) -> PaymentResult<ManualTarget> {
        let order_id = self.order_id.trim();
        let payment_id = self.payment_id.trim();
        let actor_id = self.actor_id.trim();
        if order_id.is_empty() || payment_id.is_empty() || actor_id.is_empty() {
            return Err(PaymentError::InvalidInput(
                "order id, payment id and actor id are required".into(),
            ));
        }
        if let Some(amount) = self.amount
            && amount <= 0
        {
            return Err(PaymentError::InvalidInput("amount must be positive".into()));
        }
        Ok(ManualTarget {
            order_id: order_id.to_string(),
            payment_id: payment_id.to_string(),
            actor_id: actor_id.to_string(),
        })
    }

    /// 转发给处理器的元数据
    fn processor_metadata(&self, target: &ManualTarget) -> BTreeMap<String, String> {
        let mut metadata: BTreeMap<String, String> = self
            .metadata
            .iter()
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        metadata.insert("order_id".into(), target.order_id.clone());
        metadata.insert("payment_id".into(), target.payment_id.clone());
        metadata.insert("actor_id".into(), target.actor_id.clone());
        let reason = self.reason.trim();
        if !reason.is_empty() {
            metadata.insert("reason".into(), reason.to_string());
        }
        metadata
    }
}

pub struct PaymentService {
    orders: Arc<dyn OrderRepo>,
    payments: Arc<dyn PaymentRepo>,
    processor: Arc<dyn PaymentProcessor>,
    uow: Arc<dyn UnitOfWork>,
    audit: Arc<dyn AuditLogService>,
    clock: Arc<dyn Clock>,
}

impl PaymentService {
    pub fn new(
        orders: Arc<dyn OrderRepo>,
        payments: Arc<dyn PaymentRepo>,
        processor: Arc<dyn PaymentProcessor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orders,
            payments,
            processor,
            uow: Arc::new(PassThroughUnitOfWork),
            audit: Arc::new(NoopAuditLog),
            clock,
        }
    }

    pub fn with_unit_of_work(mut self, uow: Arc<dyn UnitOfWork>) -> Self {
        self.uow = uow;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLogService>) -> Self {
        self.audit = audit;
        self
    }

    // ========================================================================
    // Webhook
    // ========================================================================

    /// 处理处理器 webhook
    ///
    /// Duplicate event ids and unhandled event types succeed without writes.
    pub async fn record_webhook_event(&self, cmd: PaymentWebhookCommand) -> PaymentResult<()> {
        let provider = cmd.provider.trim().to_ascii_lowercase();
        if provider != PROVIDER_STRIPE {
            tracing::warn!(provider = %provider, "payments.webhook.unsupported_provider");
            return Ok(());
        }
        let Some(event) = parse_event(&cmd)? else {
            return Ok(());
        };
        let order_id = event.order_id().map(str::to_string).ok_or_else(|| {
            PaymentError::NotFound(format!("webhook {} carries no order id", event.id))
        })?;
        let now = self.clock.now();

        let outcome = run_in_tx(self.uow.as_ref(), || async {
            let order = self.load_order(&order_id).await?;
            let payments = self.payments.list_by_order(&order.id).await?;
            let payment = locate_webhook_payment(&payments, &event)?;
            if payment.webhook_event_seen(&event.id) {
                return Ok(None);
            }
            if let Some(currency) = event.currency() {
                let order_currency = order.currency.trim();
                if !order_currency.is_empty() && !currency.eq_ignore_ascii_case(order_currency) {
                    return Err(PaymentError::InvalidInput(format!(
                        "currency mismatch: order {} uses {}, event carries {}",
                        order.id, order_currency, currency
                    )));
                }
            }
            let updated = event.apply(payment, now);
            self.write_and_reconcile(payment, &updated, now).await?;
            Ok::<_, PaymentError>(Some(updated))
        })
        .await?;

        match outcome {
            Some(payment) => tracing::info!(
                event_id = %event.id,
                event_type = %event.event_type,
                order_id = %payment.order_id,
                payment_id = %payment.id,
                status = %payment.status,
                "payments.webhook.processed"
            ),
            None => tracing::debug!(event_id = %event.id, "payments.webhook.duplicate"),
        }
        Ok(())
    }

    // ========================================================================
    // Manual actions
    // ========================================================================

    pub async fn manual_capture(&self, cmd: ManualPaymentCommand) -> PaymentResult<Payment> {
        let target = cmd.validate()?;
        let (order, payment) = self
            .load_order_payment(&target.order_id, &target.payment_id)
            .await?;

        let payment_currency = payment.currency.trim();
        if !payment_currency.is_empty()
            && !payment_currency.eq_ignore_ascii_case(order.currency.trim())
        {
            return Err(PaymentError::InvalidInput(format!(
                "payment currency {} does not match order currency {}",
                payment_currency, order.currency
            )));
        }
        if payment.captured {
            return Err(PaymentError::InvalidState(format!(
                "payment {} already captured",
                payment.id
            )));
        }
        if let Some(amount) = cmd.amount
            && payment.amount > 0
            && amount > payment.amount
        {
            return Err(PaymentError::InvalidInput(format!(
                "capture amount {} exceeds authorized amount {}",
                amount, payment.amount
            )));
        }

        let intent_id = require_intent(&payment)?;
        let idempotency_key = derive_idempotency_key(
            ACTION_CAPTURE,
            cmd.idempotency_key.as_deref(),
            &target.order_id,
            &target.payment_id,
            cmd.amount,
        );
        let metadata = cmd.processor_metadata(&target);
        let ctx = payment_context(&order, &payment, metadata.clone());
        let details = self
            .processor
            .capture(
                &ctx,
                CaptureRequest {
                    intent_id,
                    amount: cmd.amount,
                    idempotency_key: idempotency_key.clone(),
                    metadata,
                },
            )
            .await
            .map_err(|e| processor_failure("capture", e))?;

        let now = self.clock.now();
        let updated = apply_payment_details(&payment, &details, now);
        run_in_tx(self.uow.as_ref(), || {
            self.write_and_reconcile(&payment, &updated, now)
        })
        .await?;

        let mut diff = BTreeMap::new();
        push_change(&mut diff, "status", json!(payment.status), json!(updated.status));
        push_change(&mut diff, "captured", json!(payment.captured), json!(updated.captured));
        self.record_audit(
            AuditAction::PaymentManualCapture,
            &target,
            &cmd,
            &updated,
            updated.amount,
            &idempotency_key,
            diff,
        )
        .await;
        Ok(updated)
    }

    pub async fn manual_refund(&self, cmd: ManualPaymentCommand) -> PaymentResult<Payment> {
        let target = cmd.validate()?;
        let (order, payment) = self
            .load_order_payment(&target.order_id, &target.payment_id)
            .await?;

        if !payment.captured && !payment.status_is(shared::models::payment_status::SUCCEEDED) {
            return Err(PaymentError::InvalidState(format!(
                "payment {} has not been captured",
                payment.id
            )));
        }
        let refundable = refundable_amount(&payment);
        if refundable <= 0 {
            return Err(PaymentError::InvalidState(format!(
                "payment {} has nothing left to refund",
                payment.id
            )));
        }
        if let Some(amount) = cmd.amount
            && amount > refundable
        {
            return Err(PaymentError::InvalidInput(format!(
                "refund amount {} exceeds refundable amount {}",
                amount, refundable
            )));
        }

        let intent_id = require_intent(&payment)?;
        let idempotency_key = derive_idempotency_key(
            ACTION_REFUND,
            cmd.idempotency_key.as_deref(),
            &target.order_id,
            &target.payment_id,
            cmd.amount,
        );
        let metadata = cmd.processor_metadata(&target);
        let ctx = payment_context(&order, &payment, metadata.clone());
        let details = self
            .processor
            .refund(
                &ctx,
                RefundRequest {
                    intent_id,
                    amount: cmd.amount,
                    reason: cmd.reason.trim().to_string(),
                    idempotency_key: idempotency_key.clone(),
                    metadata,
                },
            )
            .await
            .map_err(|e| processor_failure("refund", e))?;

        let now = self.clock.now();
        let updated = apply_payment_details(&payment, &details, now);
        run_in_tx(self.uow.as_ref(), || {
            self.write_and_reconcile(&payment, &updated, now)
        })
        .await?;

        let mut diff = BTreeMap::new();
        push_change(&mut diff, "status", json!(payment.status), json!(updated.status));
        push_change(
            &mut diff,
            "refunded",
            json!(refunded_amount(&payment)),
            json!(refunded_amount(&updated)),
        );
        self.record_audit(
            AuditAction::PaymentManualRefund,
            &target,
            &cmd,
            &updated,
            cmd.amount.unwrap_or(0),
            &idempotency_key,
            diff,
        )
        .await;
        Ok(updated)
    }

    pub async fn list_payments(&self, order_id: &str) -> PaymentResult<Vec<Payment>> {
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(PaymentError::InvalidInput("order id is required".into()));
        }
        let order = self.load_order(order_id).await?;
        Ok(self.payments.list_by_order(&order.id).await?)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    async fn load_order(&self, order_id: &str) -> PaymentResult<Order> {
        self.orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("order {}", order_id)))
    }

    async fn load_order_payment(
        &self,
        order_id: &str,
        payment_id: &str,
    ) -> PaymentResult<(Order, Payment)> {
        let order = self.load_order(order_id).await?;
        let payment = self
            .payments
            .list_by_order(&order.id)
            .await?
            .into_iter()
            .find(|p| p.id.eq_ignore_ascii_case(payment_id))
            .ok_or_else(|| PaymentError::NotFound(format!("payment {}", payment_id)))?;
        if payment.order_id != order.id {
            return Err(PaymentError::NotFound(format!(
                "payment {} does not belong to order {}",
                payment_id, order.id
            )));
        }
        Ok((order, payment))
    }

    /// 写入支付并重算订单汇总；调用方负责事务
    async fn write_and_reconcile(
        &self,
        before: &Payment,
        updated: &Payment,
        now: DateTime<Utc>,
    ) -> PaymentResult<Order> {
        self.payments
            .update(updated, Some(before.updated_at))
            .await?;

        let payments = self.payments.list_by_order(&updated.order_id).await?;
        let mut order = self.load_order(&updated.order_id).await?;
        let expected = order.updated_at;
        let summary = apply_payment_summary(&mut order, &payments, now)?;
        order.updated_at = now;
        self.orders.update(&order, Some(expected)).await?;

        tracing::info!(
            order_id = %order.id,
            order_status = %order.status,
            payment_status = %summary.status,
            captured = summary.captured_amount,
            refunded = summary.refunded_amount,
            balance_due = summary.balance_due,
            "payments.order.updated"
        );
        Ok(order)
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_audit(
        &self,
        action: AuditAction,
        target: &ManualTarget,
        cmd: &ManualPaymentCommand,
        payment: &Payment,
        amount: i64,
        idempotency_key: &str,
        diff: crate::audit::AuditDiff,
    ) {
        let mut metadata = Metadata::new();
        metadata.insert("orderId".into(), json!(target.order_id));
        metadata.insert("paymentId".into(), json!(target.payment_id));
        metadata.insert("provider".into(), json!(payment.provider));
        metadata.insert("currency".into(), json!(payment.currency));
        metadata.insert("amount".into(), json!(amount));
        metadata.insert("idempotencyKey".into(), json!(idempotency_key));
        let reason = cmd.reason.trim();
        if !reason.is_empty() {
            metadata.insert("reason".into(), json!(reason));
        }
        metadata.insert("status".into(), json!(payment.status));

        let record = AuditLogRecord::staff(
            &target.actor_id,
            action,
            format!("/orders/{}/payments/{}", target.order_id, target.payment_id),
            self.clock.now(),
        )
        .with_metadata(metadata)
        .with_diff(diff);
        self.audit.record(record).await;
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 重算 `Order.metadata.payment`，必要时推进到 paid
pub fn apply_payment_summary(
    order: &mut Order,
    payments: &[Payment],
    now: DateTime<Utc>,
) -> PaymentResult<PaymentSummary> {
    let captured: i64 = payments.iter().map(captured_amount).sum();
    let refunded: i64 = payments.iter().map(refunded_amount).sum();
    let status = payments
        .iter()
        .max_by_key(|p| p.updated_at)
        .map(|p| p.status.clone())
        .unwrap_or_default();
    let total = order.totals.total;

    if total > 0 && captured >= total && order.status == OrderStatus::PendingPayment {
        order.status = OrderStatus::Paid;
        if order.paid_at.is_none() {
            order.paid_at = Some(now);
        }
    }

    let summary = PaymentSummary {
        status,
        captured_amount: captured,
        refunded_amount: refunded,
        balance_due: total - (captured - refunded),
        updated_at: rfc3339_nano(&now),
    };
    let value =
        serde_json::to_value(&summary).map_err(|e| PaymentError::Internal(e.to_string()))?;
    order.metadata.insert("payment".into(), value);
    Ok(summary)
}

/// 未提供时由 `action:order:payment:amount` 的 SHA-256 派生
pub fn derive_idempotency_key(
    action: &str,
    provided: Option<&str>,
    order_id: &str,
    payment_id: &str,
    amount: Option<i64>,
) -> String {
    if let Some(key) = provided.map(str::trim).filter(|k| !k.is_empty()) {
        return key.to_string();
    }
    let amount = amount.map(|a| a.to_string()).unwrap_or_default();
    let seed = format!(
        "{}:{}:{}:{}",
        action.trim(),
        order_id.trim(),
        payment_id.trim(),
        amount
    );
    hex::encode(Sha256::digest(seed.as_bytes()))
}

fn payment_context(order: &Order, payment: &Payment, metadata: BTreeMap<String, String>) -> PaymentContext {
    PaymentContext {
        preferred_provider: payment.provider.trim().to_string(),
        currency: order.currency.trim().to_ascii_uppercase(),
        metadata,
    }
}

fn require_intent(payment: &Payment) -> PaymentResult<String> {
    let intent = payment.intent_id.trim();
    if intent.is_empty() {
        return Err(PaymentError::InvalidState(format!(
            "payment {} has no processor intent",
            payment.id
        )));
    }
    Ok(intent.to_string())
}

/// 按显式 payment id，否则按 intent id 查找
fn locate_webhook_payment<'a>(
    payments: &'a [Payment],
    event: &WebhookEvent,
) -> PaymentResult<&'a Payment> {
    if let Some(payment_id) = event.payment_id() {
        return payments
            .iter()
            .find(|p| p.id.eq_ignore_ascii_case(payment_id))
            .ok_or_else(|| PaymentError::NotFound(format!("payment {}", payment_id)));
    }
    let intent_id = event.intent_id().ok_or_else(|| {
        PaymentError::NotFound(format!("webhook {} carries no payment reference", event.id))
    })?;
    payments
        .iter()
        .find(|p| p.intent_id.trim() == intent_id)
        .ok_or_else(|| PaymentError::NotFound(format!("payment for intent {}", intent_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::db::MemoryStore;
    use crate::payments::processor::{PaymentDetails, ProcessorError};
    use crate::testing::{FixedClock, StubPaymentProcessor, sample_order, sample_payment};
    use shared::models::{RAW_WEBHOOK_EVENTS, payment_status};

    struct Fixture {
        store: MemoryStore,
        processor: Arc<StubPaymentProcessor>,
        audit: Arc<MemoryAuditLog>,
        service: PaymentService,
    }

    async fn fixture(order: Order, payment: Payment) -> Fixture {
        let clock = Arc::new(FixedClock::at_rfc3339("2025-05-10T09:00:00Z"));
        let store = MemoryStore::with_clock(clock.clone());
        store.orders().insert(&order).await.unwrap();
        store.payments().insert(&payment).await.unwrap();
        let processor = Arc::new(StubPaymentProcessor::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let service = PaymentService::new(
            Arc::new(store.orders()),
            Arc::new(store.payments()),
            processor.clone(),
            clock,
        )
        .with_unit_of_work(Arc::new(store.unit_of_work()))
        .with_audit(audit.clone());
        Fixture {
            store,
            processor,
            audit,
            service,
        }
    }

    fn capture_cmd(amount: Option<i64>) -> ManualPaymentCommand {
        ManualPaymentCommand {
            order_id: " ord_1 ".into(),
            payment_id: "PAY_1".into(),
            actor_id: "staff_1".into(),
            amount,
            ..Default::default()
        }
    }

    #[test]
    fn test_idempotency_key_derivation() {
        assert_eq!(
            derive_idempotency_key(ACTION_CAPTURE, Some("  key-1 "), "o", "p", Some(1)),
            "key-1"
        );
        let derived = derive_idempotency_key(ACTION_CAPTURE, None, "ord_1", "pay_1", Some(500));
        let expected = hex::encode(Sha256::digest(b"manual_capture:ord_1:pay_1:500"));
        assert_eq!(derived, expected);
        let no_amount = derive_idempotency_key(ACTION_REFUND, Some(" "), "ord_1", "pay_1", None);
        assert_eq!(no_amount, hex::encode(Sha256::digest(b"manual_refund:ord_1:pay_1:")));
    }

    #[test]
    fn test_summary_promotes_pending_order() {
        let now = Utc::now();
        let mut order = sample_order("ord_1", 10000);
        let mut payment = sample_payment("pay_1", "ord_1", 10000);
        payment.captured = true;
        payment.status = payment_status::SUCCEEDED.into();

        let summary = apply_payment_summary(&mut order, &[payment], now).unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.paid_at, Some(now));
        assert_eq!(summary.balance_due, 0);
        assert_eq!(order.metadata["payment"]["capturedAmount"], json!(10000));
        assert_eq!(order.metadata["payment"]["status"], json!("succeeded"));
    }

    #[test]
    fn test_summary_does_not_promote_zero_total() {
        let mut order = sample_order("ord_1", 0);
        let summary = apply_payment_summary(&mut order, &[], Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert_eq!(summary.status, "");
        assert_eq!(summary.balance_due, 0);
    }

    #[tokio::test]
    async fn test_capture_validation() {
        let fx = fixture(sample_order("ord_1", 10000), sample_payment("pay_1", "ord_1", 10000)).await;

        let mut cmd = capture_cmd(None);
        cmd.actor_id = " ".into();
        assert!(matches!(
            fx.service.manual_capture(cmd).await,
            Err(PaymentError::InvalidInput(_))
        ));
        assert!(matches!(
            fx.service.manual_capture(capture_cmd(Some(0))).await,
            Err(PaymentError::InvalidInput(_))
        ));
        assert!(matches!(
            fx.service.manual_capture(capture_cmd(Some(10001))).await,
            Err(PaymentError::InvalidInput(_))
        ));
        let mut missing = capture_cmd(None);
        missing.payment_id = "pay_404".into();
        assert!(matches!(
            fx.service.manual_capture(missing).await,
            Err(PaymentError::NotFound(_))
        ));
        assert!(fx.processor.captures().is_empty());
    }

    #[tokio::test]
    async fn test_capture_rejects_currency_mismatch_and_captured() {
        let mut payment = sample_payment("pay_1", "ord_1", 10000);
        payment.currency = "USD".into();
        let fx = fixture(sample_order("ord_1", 10000), payment).await;
        assert!(matches!(
            fx.service.manual_capture(capture_cmd(None)).await,
            Err(PaymentError::InvalidInput(_))
        ));

        let mut payment = sample_payment("pay_1", "ord_1", 10000);
        payment.captured = true;
        let fx = fixture(sample_order("ord_1", 10000), payment).await;
        assert!(matches!(
            fx.service.manual_capture(capture_cmd(None)).await,
            Err(PaymentError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_capture_forwards_context_and_audits() {
        let fx = fixture(sample_order("ord_1", 10000), sample_payment("pay_1", "ord_1", 10000)).await;
        fx.processor.respond_capture(Ok(PaymentDetails {
            status: payment_status::SUCCEEDED.into(),
            amount: 10000,
            captured: true,
            ..Default::default()
        }));

        let mut cmd = capture_cmd(None);
        cmd.metadata.insert(" source ".into(), "console".into());
        let updated = fx.service.manual_capture(cmd).await.unwrap();
        assert!(updated.captured);

        let calls = fx.processor.captures();
        assert_eq!(calls.len(), 1);
        let (ctx, req) = &calls[0];
        assert_eq!(ctx.currency, "JPY");
        assert_eq!(ctx.preferred_provider, "stripe");
        assert_eq!(req.intent_id, "pi_pay_1");
        assert_eq!(req.metadata.get("source").map(String::as_str), Some("console"));
        assert_eq!(req.metadata.get("actor_id").map(String::as_str), Some("staff_1"));
        assert_eq!(
            req.idempotency_key,
            derive_idempotency_key(ACTION_CAPTURE, None, "ord_1", "PAY_1", None)
        );

        let records = fx.audit.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, AuditAction::PaymentManualCapture);
        assert_eq!(records[0].target_ref, "/orders/ord_1/payments/PAY_1");
        assert!(records[0].diff.contains_key("captured"));
    }

    #[tokio::test]
    async fn test_processor_failure_leaves_state_untouched() {
        let fx = fixture(sample_order("ord_1", 10000), sample_payment("pay_1", "ord_1", 10000)).await;
        fx.processor
            .respond_capture(Err(ProcessorError::Declined("card_declined".into())));

        let err = fx.service.manual_capture(capture_cmd(None)).await.unwrap_err();
        assert_eq!(err, PaymentError::Processor("capture failed: card_declined".into()));
        let stored = fx.store.payments().find_by_id("ord_1", "pay_1").await.unwrap().unwrap();
        assert!(!stored.captured);
        assert!(fx.audit.is_empty());
    }

    #[tokio::test]
    async fn test_refund_requires_capture() {
        let fx = fixture(sample_order("ord_1", 10000), sample_payment("pay_1", "ord_1", 10000)).await;
        assert!(matches!(
            fx.service.manual_refund(capture_cmd(Some(100))).await,
            Err(PaymentError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_refund_capped_at_net_captured() {
        let mut payment = sample_payment("pay_1", "ord_1", 10000);
        payment.captured = true;
        payment.status = payment_status::SUCCEEDED.into();
        payment.raw.insert("amount_received".into(), json!(10000));
        payment.raw.insert("amount_refunded".into(), json!(7000));
        let fx = fixture(sample_order("ord_1", 10000), payment).await;
        assert!(matches!(
            fx.service.manual_refund(capture_cmd(Some(3001))).await,
            Err(PaymentError::InvalidInput(_))
        ));
        assert!(fx.processor.refunds().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_duplicate_is_noop() {
        let mut payment = sample_payment("pay_1", "ord_1", 10000);
        payment
            .raw
            .insert(RAW_WEBHOOK_EVENTS.into(), json!({"evt_1": {"type": "payment_intent.succeeded"}}));
        let fx = fixture(sample_order("ord_1", 10000), payment.clone()).await;

        let payload = json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_pay_1", "metadata": {"order_id": "ord_1"}}}
        });
        fx.service
            .record_webhook_event(PaymentWebhookCommand {
                provider: "Stripe".into(),
                payload: serde_json::to_vec(&payload).unwrap(),
                headers: BTreeMap::new(),
            })
            .await
            .unwrap();

        let stored = fx.store.payments().find_by_id("ord_1", "pay_1").await.unwrap().unwrap();
        assert_eq!(stored, payment);
        let order = fx.store.orders().find_by_id("ord_1").await.unwrap().unwrap();
        assert!(order.metadata.get("payment").is_none());
    }

    #[tokio::test]
    async fn test_webhook_unknown_order_is_ignorable() {
        let fx = fixture(sample_order("ord_1", 10000), sample_payment("pay_1", "ord_1", 10000)).await;
        let payload = json!({
            "id": "evt_2",
            "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_x", "metadata": {"orderId": "ord_404"}}}
        });
        let err = fx
            .service
            .record_webhook_event(PaymentWebhookCommand {
                provider: "stripe".into(),
                payload: serde_json::to_vec(&payload).unwrap(),
                headers: BTreeMap::new(),
            })
            .await
            .unwrap_err();
        assert!(err.is_ignorable_webhook());
    }

    #[tokio::test]
    async fn test_webhook_currency_mismatch_rejected() {
        let fx = fixture(sample_order("ord_1", 10000), sample_payment("pay_1", "ord_1", 10000)).await;
        let payload = json!({
            "id": "evt_3",
            "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_pay_1", "currency": "usd", "metadata": {"order_id": "ord_1"}}}
        });
        let err = fx
            .service
            .record_webhook_event(PaymentWebhookCommand {
                provider: "stripe".into(),
                payload: serde_json::to_vec(&payload).unwrap(),
                headers: BTreeMap::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_non_stripe_provider_ignored() {
        let fx = fixture(sample_order("ord_1", 10000), sample_payment("pay_1", "ord_1", 10000)).await;
        fx.service
            .record_webhook_event(PaymentWebhookCommand {
                provider: "paypal".into(),
                payload: b"not json".to_vec(),
                headers: BTreeMap::new(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_payments_by_order() {
        let fx = fixture(sample_order("ord_1", 10000), sample_payment("pay_1", "ord_1", 10000)).await;
        let payments = fx.service.list_payments(" ord_1 ").await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].id, "pay_1");

        assert!(matches!(
            fx.service.list_payments("").await,
            Err(PaymentError::InvalidInput(_))
        ));
        assert!(matches!(
            fx.service.list_payments("ord_missing").await,
            Err(PaymentError::NotFound(_))
        ));
    }
}
