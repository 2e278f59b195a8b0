//! 导出任务发布端口
//!
//! - [`NoopExportPublisher`] 只记录消息（本地开发 / 测试）
//! - [`ChannelExportPublisher`] 投递到进程内 job worker 通道

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::jobs::JobMessage;

pub const EXPORT_TOPIC: &str = "export.bigquery";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("export queue closed")]
    Closed,

    #[error("{0}")]
    Failed(String),
}

/// 投递给后台 worker 的导出消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BigQueryExportMessage {
    pub task_id: String,
    pub actor_id: String,
    pub entities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_to: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub idempotency_key: String,
    pub queued_at: DateTime<Utc>,
}

#[async_trait]
pub trait ExportJobPublisher: Send + Sync {
    /// Returns the broker message id
    async fn publish_bigquery_export(
        &self,
        message: BigQueryExportMessage,
    ) -> Result<String, PublishError>;
}

/// 记录消息，返回 `noop-N`
#[derive(Debug, Default)]
pub struct NoopExportPublisher {
    messages: Mutex<Vec<BigQueryExportMessage>>,
}

impl NoopExportPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<BigQueryExportMessage> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl ExportJobPublisher for NoopExportPublisher {
    async fn publish_bigquery_export(
        &self,
        message: BigQueryExportMessage,
    ) -> Result<String, PublishError> {
        let mut messages = self.messages.lock();
        messages.push(message);
        Ok(format!("noop-{}", messages.len()))
    }
}

/// 进程内通道发布器
#[derive(Debug, Clone)]
pub struct ChannelExportPublisher {
    tx: mpsc::Sender<JobMessage>,
}

impl ChannelExportPublisher {
    pub fn new(tx: mpsc::Sender<JobMessage>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ExportJobPublisher for ChannelExportPublisher {
    async fn publish_bigquery_export(
        &self,
        message: BigQueryExportMessage,
    ) -> Result<String, PublishError> {
        let data = serde_json::to_vec(&message).map_err(|e| PublishError::Failed(e.to_string()))?;
        let mut attributes = BTreeMap::new();
        attributes.insert("topic".to_string(), EXPORT_TOPIC.to_string());
        attributes.insert("taskId".to_string(), message.task_id.clone());
        let id = format!("msg-{}", message.task_id);
        self.tx
            .send(JobMessage::new(id.clone(), data).with_attributes(attributes))
            .await
            .map_err(|_| PublishError::Closed)?;
        Ok(id)
    }
}
