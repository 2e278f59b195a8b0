//! BigQuery 导出 Job

use async_trait::async_trait;
use std::sync::Arc;

use shared::models::SystemTaskStatus;

use super::{JobError, JobMessage, JobProcessor, JobResult};
use crate::export::{BigQueryExportMessage, ExportError, ExportService, StartBigQuerySyncCommand};

/// 导出申请（进入 [`ExportService`] 的幂等入口）
pub const EXPORT_REQUEST_TOPIC: &str = "export.request";

/// 实际执行导出的端口
#[async_trait]
pub trait ExportHandler: Send + Sync {
    async fn handle(&self, message: &BigQueryExportMessage) -> JobResult<()>;
}

pub struct ExportJobProcessor {
    handler: Arc<dyn ExportHandler>,
}

impl ExportJobProcessor {
    pub fn new(handler: Arc<dyn ExportHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl JobProcessor for ExportJobProcessor {
    async fn process(&self, message: &JobMessage) -> JobResult<()> {
        let mut payload: BigQueryExportMessage = message.decode_json()?;
        payload.task_id = payload.task_id.trim().to_string();
        payload.actor_id = payload.actor_id.trim().to_string();
        payload.entities = payload
            .entities
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();

        if payload.task_id.is_empty() {
            return Err(JobError::Permanent("taskId is required".into()));
        }
        if payload.actor_id.is_empty() {
            return Err(JobError::Permanent("actorId is required".into()));
        }
        if payload.entities.is_empty() {
            return Err(JobError::Permanent("entities are required".into()));
        }

        self.handler.handle(&payload).await?;
        tracing::info!(
            message_id = %message.id,
            task_id = %payload.task_id,
            entities = %payload.entities.join(","),
            "job handled"
        );
        Ok(())
    }
}

/// 把队列上的导出申请交给 [`ExportService::start_bigquery_sync`]
pub struct ExportRequestProcessor {
    service: Arc<ExportService>,
}

impl ExportRequestProcessor {
    pub fn new(service: Arc<ExportService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobProcessor for ExportRequestProcessor {
    async fn process(&self, message: &JobMessage) -> JobResult<()> {
        let cmd: StartBigQuerySyncCommand = message.decode_json()?;
        let task = self.service.start_bigquery_sync(cmd).await.map_err(classify)?;
        tracing::debug!(message_id = %message.id, task_id = %task.id, "export request accepted");
        Ok(())
    }
}

/// 进程内处理器：把任务推进到 running → succeeded
///
/// 不做真正的数据搬运，只回写任务状态。
pub struct TaskStatusExportHandler {
    service: Arc<ExportService>,
}

impl TaskStatusExportHandler {
    pub fn new(service: Arc<ExportService>) -> Self {
        Self { service }
    }
}

fn classify(err: ExportError) -> JobError {
    match err {
        ExportError::Publish(_) => JobError::Transient(err.to_string()),
        other => JobError::Permanent(other.to_string()),
    }
}

#[async_trait]
impl ExportHandler for TaskStatusExportHandler {
    async fn handle(&self, message: &BigQueryExportMessage) -> JobResult<()> {
        self.service
            .update_task_status(&message.task_id, SystemTaskStatus::Running, None, None)
            .map_err(classify)?;
        let result_ref = format!("bigquery://exports/{}", message.task_id);
        self.service
            .update_task_status(
                &message.task_id,
                SystemTaskStatus::Succeeded,
                Some(result_ref),
                None,
            )
            .map_err(classify)?;
        Ok(())
    }
}
