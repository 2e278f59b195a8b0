//! 支付结算模块
//!
//! - [`PaymentService`] - webhook 入账、手动请款/退款、订单汇总
//! - [`PaymentProcessor`] - 外部处理器端口
//! - [`amounts`] - 从处理器 payload 推导金额

pub mod amounts;
mod error;
mod processor;
mod service;
mod webhook;

pub use amounts::{captured_amount, refundable_amount, refunded_amount};
pub use error::{PaymentError, PaymentResult};
pub use processor::{
    CaptureRequest, PaymentContext, PaymentDetails, PaymentProcessor, ProcessorError,
    RefundRequest, apply_payment_details,
};
pub use service::{ManualPaymentCommand, PaymentService, apply_payment_summary, derive_idempotency_key};
pub use webhook::{PROVIDER_STRIPE, PaymentWebhookCommand, WebhookEvent, WebhookKind, parse_event};
