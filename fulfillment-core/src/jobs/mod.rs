//! 后台 Job 处理
//!
//! ```text
//! publisher ──mpsc──► JobWorker ──► JobRouter ──topic──► JobProcessor
//!                        │
//!                        ├─ Ok          → ack
//!                        ├─ Permanent   → ack + warn（不再重试）
//!                        └─ Transient   → 退避重试，超过次数后丢弃
//! ```
//!
//! # 模块结构
//!
//! - [`JobMessage`] - 消息信封（id / JSON data / attributes）
//! - [`JobWorker`] - 通道消费者，带重试
//! - [`JobRouter`] - 按 `topic` 属性分发
//! - [`InvoiceJobProcessor`] / [`ExportJobProcessor`] - 具体处理器

mod export;
mod invoice;
mod worker;

pub use export::{
    EXPORT_REQUEST_TOPIC, ExportHandler, ExportJobProcessor, ExportRequestProcessor,
    TaskStatusExportHandler,
};
pub use invoice::{INVOICE_TOPIC, InvoiceJobProcessor};
pub use worker::{JobRouter, JobWorker, RetryPolicy};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use shared::error::{AppError, ErrorCode};
use std::collections::BTreeMap;
use thiserror::Error;

/// 属性键：路由用的 topic
pub const ATTR_TOPIC: &str = "topic";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    /// 重试也不会成功（输入非法、冲突、目标不存在、解码失败）
    #[error("permanent job failure: {0}")]
    Permanent(String),

    #[error("transient job failure: {0}")]
    Transient(String),
}

impl JobError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, JobError::Permanent(_))
    }
}

pub type JobResult<T> = Result<T, JobError>;

impl From<JobError> for AppError {
    fn from(err: JobError) -> Self {
        let code = match &err {
            JobError::Permanent(_) => ErrorCode::InvalidRequest,
            JobError::Transient(_) => ErrorCode::DependencyUnavailable,
        };
        AppError::with_message(code, err.to_string())
    }
}

/// 队列消息信封
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobMessage {
    pub id: String,
    /// JSON payload
    pub data: Vec<u8>,
    pub attributes: BTreeMap<String, String>,
    /// 1-based, incremented by the worker
    pub delivery_attempt: u32,
}

impl JobMessage {
    pub fn new(id: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            data,
            attributes: BTreeMap::new(),
            delivery_attempt: 0,
        }
    }

    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.attributes.insert(ATTR_TOPIC.to_string(), topic.into());
        self
    }

    pub fn topic(&self) -> Option<&str> {
        self.attributes.get(ATTR_TOPIC).map(String::as_str)
    }

    /// Decode failures are permanent
    pub fn decode_json<T: DeserializeOwned>(&self) -> JobResult<T> {
        serde_json::from_slice(&self.data)
            .map_err(|e| JobError::Permanent(format!("decode payload: {e}")))
    }
}

#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, message: &JobMessage) -> JobResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        value: i64,
    }

    #[test]
    fn test_decode_failure_is_permanent() {
        let msg = JobMessage::new("m1", b"not json".to_vec());
        let err = msg.decode_json::<Payload>().unwrap_err();
        assert!(err.is_permanent());

        let ok = JobMessage::new("m2", br#"{"value":7}"#.to_vec());
        assert_eq!(ok.decode_json::<Payload>().unwrap().value, 7);
    }

    #[test]
    fn test_topic_attribute() {
        let msg = JobMessage::new("m1", Vec::new()).with_topic("export.bigquery");
        assert_eq!(msg.topic(), Some("export.bigquery"));
        assert_eq!(JobMessage::new("m2", Vec::new()).topic(), None);
    }

    #[test]
    fn test_job_error_codes() {
        let app: AppError = JobError::Transient("down".into()).into();
        assert_eq!(app.code, ErrorCode::DependencyUnavailable);
        let app: AppError = JobError::Permanent("bad".into()).into();
        assert_eq!(app.code, ErrorCode::InvalidRequest);
    }
}
