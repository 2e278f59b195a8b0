//! BigQuery 导出调度
//!
//! ```text
//! StartBigQuerySync
//!   │ 校验
//!   ▼
//! 按幂等键加锁（DashMap<key, Mutex>）
//!   ├─ 已登记 → 返回已有任务（不发布）
//!   └─ 新任务 → publish（登记表锁之外）→ 成功后登记 id / 幂等键
//! ```
//!
//! 登记表只存在于进程内，重启即清空。

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use shared::models::{Metadata, SystemTask, SystemTaskStatus, TASK_KIND_BIGQUERY_EXPORT};
use shared::util::rfc3339_nano;

use super::error::{ExportError, ExportResult};
use super::publisher::{BigQueryExportMessage, ExportJobPublisher};
use crate::core::{Clock, IdGenerator, PrefixedTaskIdGenerator};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportWindow {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBigQuerySyncCommand {
    pub actor_id: String,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub window: Option<ExportWindow>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Default)]
struct Registry {
    by_id: HashMap<String, SystemTask>,
    by_key: HashMap<String, String>,
}

pub struct ExportService {
    publisher: Arc<dyn ExportJobPublisher>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    registry: Mutex<Registry>,
    key_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl ExportService {
    pub fn new(publisher: Arc<dyn ExportJobPublisher>, clock: Arc<dyn Clock>) -> Self {
        Self::with_id_generator(publisher, clock, Arc::new(PrefixedTaskIdGenerator))
    }

    pub fn with_id_generator(
        publisher: Arc<dyn ExportJobPublisher>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            publisher,
            clock,
            ids,
            registry: Mutex::new(Registry::default()),
            key_locks: DashMap::new(),
        }
    }

    pub async fn start_bigquery_sync(&self, cmd: StartBigQuerySyncCommand) -> ExportResult<SystemTask> {
        let actor = cmd.actor_id.trim().to_string();
        if actor.is_empty() {
            return Err(ExportError::InvalidInput("actor id is required".into()));
        }
        let entities: Vec<String> = cmd
            .entities
            .iter()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();
        if entities.is_empty() {
            return Err(ExportError::InvalidInput(
                "at least one entity is required".into(),
            ));
        }
        let window = cmd.window.unwrap_or_default();
        if let (Some(from), Some(to)) = (window.from, window.to)
            && from > to
        {
            return Err(ExportError::InvalidInput(
                "window from must be before to".into(),
            ));
        }
        let key = shared::util::non_blank(cmd.idempotency_key.as_deref());

        let Some(k) = key else {
            return self.publish_task(actor, entities, window, None).await;
        };

        // 同一幂等键串行化，保证最多发布一次
        let key_lock = self
            .key_locks
            .entry(k.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let result = {
            let _guard = key_lock.lock().await;
            match self.lookup_by_key(&k) {
                Some(existing) => {
                    tracing::debug!(task_id = %existing.id, "export.bigquery.deduplicated");
                    Ok(existing)
                }
                None => self.publish_task(actor, entities, window, Some(k.clone())).await,
            }
        };

        // 成功后由 registry 去重；无其他等待者时释放该键的锁
        drop(key_lock);
        self.key_locks.remove_if(&k, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn publish_task(
        &self,
        actor: String,
        entities: Vec<String>,
        window: ExportWindow,
        key: Option<String>,
    ) -> ExportResult<SystemTask> {
        let now = self.clock.now();
        let task_id = match self.ids.new_id().trim() {
            "" => PrefixedTaskIdGenerator.new_id(),
            id => id.to_string(),
        };

        let mut parameters = Metadata::new();
        parameters.insert("entities".into(), json!(entities));
        if let Some(from) = window.from {
            parameters.insert("windowFrom".into(), json!(rfc3339_nano(&from)));
        }
        if let Some(to) = window.to {
            parameters.insert("windowTo".into(), json!(rfc3339_nano(&to)));
        }
        let task = SystemTask {
            id: task_id.clone(),
            kind: TASK_KIND_BIGQUERY_EXPORT.into(),
            status: SystemTaskStatus::Pending,
            requested_by: actor.clone(),
            idempotency_key: key.clone(),
            parameters,
            metadata: Metadata::new(),
            result_ref: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let message = BigQueryExportMessage {
            task_id: task_id.clone(),
            actor_id: actor.clone(),
            entities: entities.clone(),
            window_from: window.from,
            window_to: window.to,
            idempotency_key: key.clone().unwrap_or_default(),
            queued_at: now,
        };
        let message_id = self.publisher.publish_bigquery_export(message).await?;

        {
            let mut registry = self.registry.lock();
            if let Some(k) = &key {
                registry.by_key.insert(k.clone(), task_id.clone());
            }
            registry.by_id.insert(task_id.clone(), task.clone());
        }

        tracing::info!(
            task_id = %task_id,
            actor_id = %actor,
            entities = %entities.join(","),
            message_id = %message_id,
            "export.bigquery.enqueued"
        );
        Ok(task)
    }

    pub fn get_task(&self, task_id: &str) -> ExportResult<SystemTask> {
        let task_id = task_id.trim();
        self.registry
            .lock()
            .by_id
            .get(task_id)
            .cloned()
            .ok_or_else(|| ExportError::TaskNotFound(task_id.to_string()))
    }

    /// 后台 worker 回写任务状态
    pub fn update_task_status(
        &self,
        task_id: &str,
        status: SystemTaskStatus,
        result_ref: Option<String>,
        error_message: Option<String>,
    ) -> ExportResult<SystemTask> {
        let now = self.clock.now();
        let mut registry = self.registry.lock();
        let task = registry
            .by_id
            .get_mut(task_id.trim())
            .ok_or_else(|| ExportError::TaskNotFound(task_id.to_string()))?;
        task.status = status;
        task.updated_at = now;
        if result_ref.is_some() {
            task.result_ref = result_ref;
        }
        if error_message.is_some() {
            task.error_message = error_message;
        }
        if matches!(
            status,
            SystemTaskStatus::Succeeded | SystemTaskStatus::Failed | SystemTaskStatus::Canceled
        ) {
            task.completed_at = Some(now);
        }
        Ok(task.clone())
    }

    fn lookup_by_key(&self, key: &str) -> Option<SystemTask> {
        let registry = self.registry.lock();
        registry
            .by_key
            .get(key)
            .and_then(|id| registry.by_id.get(id))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::publisher::{NoopExportPublisher, PublishError};
    use crate::testing::{FailingExportPublisher, FixedClock, SequenceIdGenerator};

    fn service(publisher: Arc<dyn ExportJobPublisher>, ids: &[&str]) -> ExportService {
        ExportService::with_id_generator(
            publisher,
            Arc::new(FixedClock::at_rfc3339("2025-05-10T00:00:00Z")),
            Arc::new(SequenceIdGenerator::new(ids.iter().copied())),
        )
    }

    fn cmd(entities: &[&str], key: Option<&str>) -> StartBigQuerySyncCommand {
        StartBigQuerySyncCommand {
            actor_id: "admin".into(),
            entities: entities.iter().map(|e| e.to_string()).collect(),
            window: None,
            idempotency_key: key.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_validation() {
        let svc = service(Arc::new(NoopExportPublisher::new()), &["task-1"]);
        let mut no_actor = cmd(&["orders"], None);
        no_actor.actor_id = " ".into();
        assert!(matches!(
            svc.start_bigquery_sync(no_actor).await,
            Err(ExportError::InvalidInput(_))
        ));
        assert!(matches!(
            svc.start_bigquery_sync(cmd(&[" "], None)).await,
            Err(ExportError::InvalidInput(_))
        ));

        let now = Utc::now();
        let mut inverted = cmd(&["orders"], None);
        inverted.window = Some(ExportWindow {
            from: Some(now),
            to: Some(now - chrono::Duration::hours(1)),
        });
        assert!(matches!(
            svc.start_bigquery_sync(inverted).await,
            Err(ExportError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_task_parameters_and_lookup() {
        let svc = service(Arc::new(NoopExportPublisher::new()), &["task-1"]);
        let from: DateTime<Utc> = "2025-05-09T00:00:00Z".parse().unwrap();
        let mut request = cmd(&["orders", " users "], None);
        request.window = Some(ExportWindow {
            from: Some(from),
            to: None,
        });
        let task = svc.start_bigquery_sync(request).await.unwrap();
        assert_eq!(task.id, "task-1");
        assert_eq!(task.kind, TASK_KIND_BIGQUERY_EXPORT);
        assert_eq!(task.status, SystemTaskStatus::Pending);
        assert_eq!(task.parameters["entities"], json!(["orders", "users"]));
        assert_eq!(task.parameters["windowFrom"], json!(rfc3339_nano(&from)));
        assert!(task.parameters.get("windowTo").is_none());
        assert_eq!(svc.get_task("task-1").unwrap(), task);
        assert!(matches!(svc.get_task("task-9"), Err(ExportError::TaskNotFound(_))));
    }

    #[tokio::test]
    async fn test_publish_failure_records_nothing() {
        let svc = service(Arc::new(FailingExportPublisher), &["task-1", "task-2"]);
        let err = svc
            .start_bigquery_sync(cmd(&["orders"], Some("idem-1")))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Publish(PublishError::Failed(_))));
        assert!(svc.get_task("task-1").is_err());
        assert!(svc.lookup_by_key("idem-1").is_none());
        assert!(svc.key_locks.is_empty());
    }

    #[tokio::test]
    async fn test_failing_keys_do_not_accumulate_locks() {
        let svc = service(Arc::new(FailingExportPublisher), &[]);
        for i in 0..20 {
            let key = format!("retry-{i}");
            assert!(svc.start_bigquery_sync(cmd(&["orders"], Some(&key))).await.is_err());
        }
        assert!(svc.key_locks.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_same_key_publishes_once() {
        let publisher = Arc::new(NoopExportPublisher::new());
        let svc = Arc::new(service(publisher.clone(), &["task-a", "task-b", "task-c"]));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let svc = svc.clone();
            handles.push(tokio::spawn(async move {
                svc.start_bigquery_sync(cmd(&["orders"], Some("same"))).await
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        assert!(ids.iter().all(|id| id == &ids[0]));
        assert_eq!(publisher.messages().len(), 1);
        assert!(svc.key_locks.is_empty());
    }

    #[tokio::test]
    async fn test_status_update_hook() {
        let svc = service(Arc::new(NoopExportPublisher::new()), &["task-1"]);
        svc.start_bigquery_sync(cmd(&["orders"], None)).await.unwrap();
        let running = svc
            .update_task_status("task-1", SystemTaskStatus::Running, None, None)
            .unwrap();
        assert_eq!(running.completed_at, None);
        let done = svc
            .update_task_status(
                "task-1",
                SystemTaskStatus::Succeeded,
                Some("gs://exports/task-1".into()),
                None,
            )
            .unwrap();
        assert!(done.completed_at.is_some());
        assert_eq!(svc.get_task("task-1").unwrap().result_ref.as_deref(), Some("gs://exports/task-1"));
    }
}
