//! Properties that must hold across services

use chrono::Duration;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use fulfillment_core::core::{Clock, InvoiceSettings};
use fulfillment_core::counters::{CounterOptions, CounterService, MemoryCounterService};
use fulfillment_core::db::Pagination;
use fulfillment_core::export::StartBigQuerySyncCommand;
use fulfillment_core::invoicing::IssueInvoicesCommand;
use fulfillment_core::payments::{PROVIDER_STRIPE, PaymentWebhookCommand};
use fulfillment_core::production::QueueInput;
use fulfillment_core::shipments::{CreateShipmentCommand, ShipmentError};
use fulfillment_core::testing::{
    FailingRenderer, GatedRenderer, SequenceIdGenerator, TestHarness, sample_order,
    sample_payment,
};
use shared::models::{
    OrderLineItem, OrderStatus, RAW_WEBHOOK_EVENTS, ShipmentItem, normalize_sku,
};

fn queue_input(name: &str, centers: &[&str]) -> QueueInput {
    QueueInput {
        name: name.into(),
        capacity: 20,
        work_centers: centers.iter().map(|c| c.to_string()).collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn queue_work_centers_are_normalized() {
    let harness = TestHarness::new();
    let service = harness.queue_service(SequenceIdGenerator::new(["01HXQ"]));

    let created = service
        .create_queue("admin", queue_input("刻印ライン", &["Laser", " laser ", "Polish", "LASER", ""]))
        .await
        .unwrap();
    assert_eq!(created.work_centers, vec!["Laser", "Polish"]);

    let updated = service
        .update_queue(
            "admin",
            &created.id,
            queue_input("刻印ライン", &["polish", "Pack", "POLISH", "pack "]),
        )
        .await
        .unwrap();
    assert_eq!(updated.work_centers, vec!["polish", "Pack"]);
}

#[tokio::test]
async fn queue_round_trip_preserves_created_at() {
    let harness = TestHarness::new();
    let service = harness.queue_service(SequenceIdGenerator::new(["01HXQ"]));
    let created = service
        .create_queue("admin", queue_input("研磨ライン", &["polish"]))
        .await
        .unwrap();
    let fetched = service.get_queue(&created.id).await.unwrap();
    assert_eq!(fetched, created);

    harness.clock.advance(Duration::minutes(10));
    service
        .update_queue("admin", &created.id, queue_input("研磨ライン", &["polish", "buff"]))
        .await
        .unwrap();
    let after = service.get_queue(&created.id).await.unwrap();
    assert_eq!(after.created_at, created.created_at);
    assert!(after.updated_at > created.updated_at);
}

fn shipment(items: &[(&str, i64)]) -> CreateShipmentCommand {
    CreateShipmentCommand {
        order_id: "ord_1".into(),
        carrier: "sagawa".into(),
        tracking_preference: "manual".into(),
        items: items
            .iter()
            .map(|(sku, quantity)| ShipmentItem {
                line_item_sku: sku.to_string(),
                quantity: *quantity,
            })
            .collect(),
        created_by: "staff-1".into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn shipped_quantities_never_exceed_ordered() {
    let harness = TestHarness::new();
    let mut order = sample_order("ord_1", 5000);
    order.status = OrderStatus::InProduction;
    order.items = vec![
        OrderLineItem { sku: "SKU-1".into(), name: None, quantity: 2, unit_price: 1000 },
        OrderLineItem { sku: "SKU-2".into(), name: None, quantity: 1, unit_price: 3000 },
    ];
    harness.seed_order(order.clone()).await;
    let service = harness.shipment_service(SequenceIdGenerator::new(["A1", "A2", "A3", "A4"]));

    let first = service.create_shipment(shipment(&[("SKU-1", 1)])).await.unwrap();
    assert!(matches!(
        service.create_shipment(shipment(&[("SKU-1", 2)])).await,
        Err(ShipmentError::Conflict(_))
    ));
    assert!(matches!(
        service.create_shipment(shipment(&[("SKU-3", 1)])).await,
        Err(ShipmentError::InvalidInput(_))
    ));

    // insert → list returns the same items
    let listed = service.list_shipments("ord_1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].items, first.items);
    assert_eq!(
        harness.order("ord_1").await.unwrap().status,
        OrderStatus::InProduction
    );

    service
        .create_shipment(shipment(&[("sku-1", 1), ("SKU-2", 1)]))
        .await
        .unwrap();
    assert!(service.create_shipment(shipment(&[("SKU-2", 1)])).await.is_err());

    let shipments = service.list_shipments("ord_1").await.unwrap();
    let mut shipped: BTreeMap<String, i64> = BTreeMap::new();
    for s in &shipments {
        for item in &s.items {
            *shipped.entry(normalize_sku(&item.line_item_sku)).or_default() += item.quantity;
        }
    }
    for (sku, ordered) in order.ordered_quantities() {
        assert!(shipped.get(&sku).copied().unwrap_or(0) <= ordered);
    }

    // fully shipped → promoted
    let promoted = harness.order("ord_1").await.unwrap();
    assert_eq!(promoted.status, OrderStatus::Shipped);
    assert_eq!(promoted.shipped_at, Some(harness.clock.now()));
}

fn webhook(payload: Value) -> PaymentWebhookCommand {
    PaymentWebhookCommand {
        provider: PROVIDER_STRIPE.into(),
        payload: serde_json::to_vec(&payload).unwrap(),
        headers: BTreeMap::new(),
    }
}

fn intent_succeeded(event_id: &str) -> Value {
    json!({
        "id": event_id,
        "type": "payment_intent.succeeded",
        "created": 1747735200,
        "data": {"object": {
            "id": "pi_pay_1",
            "object": "payment_intent",
            "status": "succeeded",
            "amount": 10000,
            "amount_received": 10000,
            "currency": "jpy",
            "metadata": {"order_id": "ord_1", "payment_id": "pay_1"}
        }}
    })
}

#[tokio::test]
async fn duplicate_webhooks_are_idempotent_and_balance_reconciles() {
    let harness = TestHarness::new();
    harness.seed_order(sample_order("ord_1", 10000)).await;
    harness.seed_payment(sample_payment("pay_1", "ord_1", 10000)).await;
    let service = harness.payment_service();

    service.record_webhook_event(webhook(intent_succeeded("evt_1"))).await.unwrap();
    let after_first = harness.payment("ord_1", "pay_1").await.unwrap();
    let order_after_first = harness.order("ord_1").await.unwrap();

    harness.clock.advance(Duration::seconds(30));
    service.record_webhook_event(webhook(intent_succeeded("evt_1"))).await.unwrap();
    assert_eq!(harness.payment("ord_1", "pay_1").await.unwrap(), after_first);
    assert_eq!(harness.order("ord_1").await.unwrap(), order_after_first);
    assert_eq!(order_after_first.status, OrderStatus::Paid);

    let refund = json!({
        "id": "evt_2",
        "type": "charge.refunded",
        "created": 1747738800,
        "data": {"object": {
            "id": "ch_1",
            "object": "charge",
            "payment_intent": "pi_pay_1",
            "amount_refunded": 3000,
            "currency": "jpy",
            "metadata": {"order_id": "ord_1", "payment_id": "pay_1"}
        }}
    });
    service.record_webhook_event(webhook(refund)).await.unwrap();

    let payment = harness.payment("ord_1", "pay_1").await.unwrap();
    let seen = payment.raw[RAW_WEBHOOK_EVENTS].as_object().unwrap();
    assert!(seen.contains_key("evt_1") && seen.contains_key("evt_2"));

    let order = harness.order("ord_1").await.unwrap();
    let summary = &order.metadata["payment"];
    let captured = summary["capturedAmount"].as_i64().unwrap();
    let refunded = summary["refundedAmount"].as_i64().unwrap();
    assert_eq!((captured, refunded), (10000, 3000));
    assert_eq!(
        summary["balanceDue"].as_i64().unwrap(),
        order.totals.total - (captured - refunded)
    );
}

#[tokio::test]
async fn invoice_batch_writes_exactly_one_job() {
    let harness = TestHarness::new();
    for id in ["order_1", "order_2", "order_3"] {
        harness.seed_order(sample_order(id, 1000)).await;
    }
    let service = harness.invoice_service_with(
        Arc::new(FailingRenderer),
        SequenceIdGenerator::new(["job_fail"]),
        InvoiceSettings::default(),
    );

    let result = service
        .issue_invoices(IssueInvoicesCommand {
            actor_id: "admin".into(),
            order_ids: vec!["order_1".into(), "order_2".into(), "order_3".into()],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(
        result.summary.issued + result.summary.failed,
        result.summary.total_orders
    );
    assert_eq!(result.summary.failed, 3);

    let jobs = service.list_batches(&Pagination::first(10)).await.unwrap();
    assert_eq!(jobs.items.len(), 1);
    assert_eq!(jobs.items[0].id, "job_fail");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_batch_keeps_queue_created_meanwhile() {
    let harness = TestHarness::new();
    harness.seed_order(sample_order("order_1", 1000)).await;
    let renderer = Arc::new(GatedRenderer::new());
    let invoices = Arc::new(harness.invoice_service_with(
        renderer.clone(),
        SequenceIdGenerator::new(["job_gated"]),
        InvoiceSettings::default(),
    ));
    let queues = harness.queue_service(SequenceIdGenerator::new(["queue_mid"]));

    let batch = {
        let invoices = invoices.clone();
        tokio::spawn(async move {
            invoices
                .issue_invoices(IssueInvoicesCommand {
                    actor_id: "admin".into(),
                    order_ids: vec!["order_1".into()],
                    ..Default::default()
                })
                .await
        })
    };

    // 批次事务进行中创建队列，随后让渲染失败触发回滚
    renderer.started().await;
    let created = queues
        .create_queue("admin", queue_input("刻印ライン", &["laser"]))
        .await
        .unwrap();
    renderer.release();

    let result = batch.await.unwrap().unwrap();
    assert_eq!(result.summary.failed, 1);
    assert_eq!(queues.get_queue(&created.id).await.unwrap(), created);
    assert!(harness.order("order_1").await.unwrap().metadata.get("invoiceNumber").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_batches_each_write_one_job() {
    let harness = TestHarness::new();
    for id in ["order_a1", "order_a2", "order_b1", "order_b2"] {
        harness.seed_order(sample_order(id, 1000)).await;
    }
    let service = Arc::new(harness.invoice_service_with(
        Arc::new(FailingRenderer),
        SequenceIdGenerator::new(Vec::<String>::new()),
        InvoiceSettings::default(),
    ));

    let mut handles = Vec::new();
    for ids in [["order_a1", "order_a2"], ["order_b1", "order_b2"]] {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .issue_invoices(IssueInvoicesCommand {
                    actor_id: "admin".into(),
                    order_ids: ids.iter().map(|id| id.to_string()).collect(),
                    ..Default::default()
                })
                .await
        }));
    }
    let mut job_ids = HashSet::new();
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.summary.failed, 2);
        job_ids.insert(result.job_id);
    }
    assert_eq!(job_ids.len(), 2);

    let jobs = service.list_batches(&Pagination::first(10)).await.unwrap();
    let listed: HashSet<String> = jobs.items.into_iter().map(|job| job.id).collect();
    assert_eq!(listed, job_ids);
}

#[tokio::test]
async fn concurrent_exports_with_same_key_publish_once() {
    let harness = TestHarness::new();
    let service = Arc::new(harness.export_service(SequenceIdGenerator::new(
        (0..8).map(|i| format!("task-{i}")),
    )));

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .start_bigquery_sync(StartBigQuerySyncCommand {
                    actor_id: format!("admin-{i}"),
                    entities: vec!["orders".into()],
                    window: None,
                    idempotency_key: Some("nightly".into()),
                })
                .await
        }));
    }
    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().unwrap().id);
    }
    assert_eq!(ids.len(), 1);
    assert_eq!(harness.exports.messages().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn counter_is_strictly_increasing_under_concurrency() {
    let harness = TestHarness::new();
    let counters = Arc::new(MemoryCounterService::new(harness.clock.clone()));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let counters = counters.clone();
        handles.push(tokio::spawn(async move {
            let mut values = Vec::new();
            for _ in 0..25 {
                let value = counters
                    .next("orders", "20250520", CounterOptions::default())
                    .await
                    .unwrap();
                values.push(value.value);
            }
            values
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        let values = handle.await.unwrap();
        // each caller observes a strictly increasing sequence
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        all.extend(values);
    }
    all.sort_unstable();
    assert_eq!(all, (1..=400).collect::<Vec<i64>>());
}
