//! 订单事件总线
//!
//! # 架构
//!
//! ```text
//! ShipmentService ──▶ EventPublisher::publish_order_event
//!                          │
//!          ┌───────────────┴───────────────┐
//!          ▼                               ▼
//!   BroadcastEventBus                NoopEventPublisher
//!   (tokio broadcast)                (丢弃)
//!          │
//!          ▼ subscribe()
//!   下游监听者（通知、同步）
//! ```
//!
//! 发布在事务提交之后进行，失败只记录日志，不回滚已提交的写入。

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use shared::models::OrderEvent;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("Event bus closed")]
    Closed,

    #[error("Event publish failed: {0}")]
    Failed(String),
}

/// 订单事件发布端口
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_order_event(&self, event: OrderEvent) -> Result<(), EventError>;
}

/// 丢弃所有事件
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish_order_event(&self, _event: OrderEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// 进程内广播总线
///
/// 没有订阅者时事件直接丢弃（不视为错误）。
#[derive(Debug, Clone)]
pub struct BroadcastEventBus {
    tx: broadcast::Sender<OrderEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventBus {
    async fn publish_order_event(&self, event: OrderEvent) -> Result<(), EventError> {
        let event_type = event.event_type.clone();
        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::debug!(event = %event_type, receivers, "Order event published");
            }
            Err(_) => {
                tracing::trace!(event = %event_type, "Order event dropped, no subscribers");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::models::EVENT_SHIPMENT_CREATED;

    fn event(order_id: &str) -> OrderEvent {
        OrderEvent {
            event_type: EVENT_SHIPMENT_CREATED.into(),
            order_id: order_id.into(),
            order_number: "HF-20250501-0001".into(),
            previous_status: None,
            current_status: None,
            actor_id: Some("staff-1".into()),
            occurred_at: Utc::now(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let bus = BroadcastEventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish_order_event(event("o1")).await.unwrap();
        bus.publish_order_event(event("o2")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().order_id, "o1");
        assert_eq!(rx.recv().await.unwrap().order_id, "o2");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = BroadcastEventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.publish_order_event(event("o1")).await.is_ok());
    }
}
