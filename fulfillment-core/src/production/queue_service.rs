//! 生产队列服务
//!
//! 队列定义的 CRUD 与 WIP 读模型。写操作在 UnitOfWork 中执行，
//! 提交后写审计日志（带字段级 diff）。

use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;

use shared::models::{Metadata, ProductionQueue, QueuePriority, QueueStatus, QueueWipSummary};

use super::error::{QueueError, QueueResult};
use super::wip::{NoopQueueDepthRecorder, QueueDepthRecorder, normalize_wip_summary};
use crate::audit::{AuditAction, AuditLogRecord, AuditLogService, NoopAuditLog, Severity, diff_fields};
use crate::core::{Clock, IdGenerator};
use crate::db::{
    Page, Pagination, PassThroughUnitOfWork, ProductionQueueRepo, QueueListFilter, UnitOfWork,
    run_in_tx,
};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 200;

/// 审计 diff 覆盖的字段
const AUDIT_FIELDS: [&str; 7] = [
    "name",
    "capacity",
    "workCenters",
    "priority",
    "status",
    "notes",
    "metadata",
];

/// 创建/更新队列的输入（未规范化）
#[derive(Debug, Clone, Default)]
pub struct QueueInput {
    pub id: Option<String>,
    pub name: String,
    pub capacity: i64,
    pub work_centers: Vec<String>,
    pub priority: String,
    pub status: String,
    pub notes: String,
    pub metadata: Metadata,
}

/// 列表请求；过滤值大小写不敏感
#[derive(Debug, Clone, Default)]
pub struct QueueListRequest {
    pub statuses: Vec<String>,
    pub priorities: Vec<String>,
    pub page_size: usize,
    pub page_token: Option<String>,
}

pub struct ProductionQueueService {
    queues: Arc<dyn ProductionQueueRepo>,
    uow: Arc<dyn UnitOfWork>,
    audit: Arc<dyn AuditLogService>,
    depth: Arc<dyn QueueDepthRecorder>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl ProductionQueueService {
    pub fn new(
        queues: Arc<dyn ProductionQueueRepo>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            queues,
            uow: Arc::new(PassThroughUnitOfWork),
            audit: Arc::new(NoopAuditLog),
            depth: Arc::new(NoopQueueDepthRecorder),
            clock,
            ids,
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

    pub fn with_depth_recorder(mut self, depth: Arc<dyn QueueDepthRecorder>) -> Self {
        self.depth = depth;
        self
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub async fn create_queue(&self, actor: &str, input: QueueInput) -> QueueResult<ProductionQueue> {
        let actor = require_actor(actor)?;
        let now = self.clock.now();
        let mut queue = self.normalize(input, None)?;
        queue.created_at = now;
        queue.updated_at = now;

        self.queues.insert(&queue).await?;

        self.record_audit(
            &actor,
            AuditAction::ProductionQueueCreate,
            &queue,
            &Value::Null,
            &audit_snapshot(&queue),
        )
        .await;
        tracing::info!(queue_id = %queue.id, name = %queue.name, "Production queue created");
        Ok(queue)
    }

    pub async fn update_queue(
        &self,
        actor: &str,
        id: &str,
        input: QueueInput,
    ) -> QueueResult<ProductionQueue> {
        let actor = require_actor(actor)?;
        let id = require_id(id)?;

        let (before, after) = run_in_tx(self.uow.as_ref(), || async {
            let existing = self
                .queues
                .find_by_id(&id)
                .await?
                .ok_or_else(|| QueueError::NotFound(id.clone()))?;

            let mut queue = self.normalize(input, Some(&existing))?;
            queue.id = existing.id.clone();
            queue.created_at = existing.created_at;
            queue.updated_at = self.clock.now();

            self.queues.update(&queue, existing.updated_at).await?;
            Ok::<_, QueueError>((existing, queue))
        })
        .await?;

        self.record_audit(
            &actor,
            AuditAction::ProductionQueueUpdate,
            &after,
            &audit_snapshot(&before),
            &audit_snapshot(&after),
        )
        .await;
        Ok(after)
    }

    pub async fn delete_queue(&self, actor: &str, id: &str) -> QueueResult<()> {
        let actor = require_actor(actor)?;
        let id = require_id(id)?;

        let removed = run_in_tx(self.uow.as_ref(), || async {
            let existing = self
                .queues
                .find_by_id(&id)
                .await?
                .ok_or_else(|| QueueError::NotFound(id.clone()))?;
            if self.queues.has_active_assignments(&id).await? {
                return Err(QueueError::HasAssignments(id.clone()));
            }
            self.queues.delete(&id).await?;
            Ok(existing)
        })
        .await?;

        self.record_audit(
            &actor,
            AuditAction::ProductionQueueDelete,
            &removed,
            &audit_snapshot(&removed),
            &Value::Null,
        )
        .await;
        tracing::info!(queue_id = %removed.id, "Production queue deleted");
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_queue(&self, id: &str) -> QueueResult<ProductionQueue> {
        let id = require_id(id)?;
        self.queues
            .find_by_id(&id)
            .await?
            .ok_or(QueueError::NotFound(id))
    }

    pub async fn list_queues(&self, request: QueueListRequest) -> QueueResult<Page<ProductionQueue>> {
        let filter = QueueListFilter {
            statuses: parse_filter(&request.statuses, QueueStatus::parse, "status")?,
            priorities: parse_filter(&request.priorities, QueuePriority::parse, "priority")?,
        };
        let page_size = match request.page_size {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };
        let page = Pagination::with_token(page_size, request.page_token);
        Ok(self.queues.list(&filter, &page).await?)
    }

    /// WIP 汇总（规范化后写入深度记录器）
    pub async fn queue_wip_summary(&self, id: &str) -> QueueResult<QueueWipSummary> {
        let id = require_id(id)?;
        let raw = self.queues.queue_wip_summary(&id).await?;
        let summary = normalize_wip_summary(&id, raw);
        self.depth.record(&summary);
        Ok(summary)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn normalize(
        &self,
        input: QueueInput,
        existing: Option<&ProductionQueue>,
    ) -> QueueResult<ProductionQueue> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(QueueError::Invalid("name is required".into()));
        }
        if input.capacity < 0 {
            return Err(QueueError::Invalid("capacity must be >= 0".into()));
        }

        let priority = match input.priority.trim() {
            "" => QueuePriority::default(),
            p => QueuePriority::parse(p)
                .ok_or_else(|| QueueError::Invalid(format!("unknown priority {}", p)))?,
        };
        let status = match input.status.trim() {
            "" => QueueStatus::default(),
            s => QueueStatus::parse(s)
                .ok_or_else(|| QueueError::Invalid(format!("unknown status {}", s)))?,
        };

        let id = match (input.id.as_deref().map(str::trim), existing) {
            (Some(id), _) if !id.is_empty() => id.to_string(),
            (_, Some(existing)) => existing.id.clone(),
            _ => format!("pqu_{}", self.ids.new_id().to_lowercase()),
        };

        let metadata = input
            .metadata
            .into_iter()
            .filter_map(|(k, v)| {
                let key = k.trim();
                (!key.is_empty()).then(|| (key.to_string(), v))
            })
            .collect();

        let now = self.clock.now();
        Ok(ProductionQueue {
            id,
            name,
            capacity: input.capacity,
            work_centers: normalize_work_centers(&input.work_centers),
            priority,
            status,
            notes: input.notes.trim().to_string(),
            metadata,
            created_at: now,
            updated_at: now,
        })
    }

    async fn record_audit(
        &self,
        actor: &str,
        action: AuditAction,
        queue: &ProductionQueue,
        before: &Value,
        after: &Value,
    ) {
        let mut metadata = Metadata::new();
        metadata.insert("queueId".into(), json!(queue.id));
        metadata.insert("name".into(), json!(queue.name));
        metadata.insert("status".into(), json!(queue.status.as_str()));
        metadata.insert("priority".into(), json!(queue.priority.as_str()));

        let mut record = AuditLogRecord::staff(
            actor,
            action,
            format!("/production-queues/{}", queue.id),
            self.clock.now(),
        )
        .with_metadata(metadata)
        .with_diff(diff_fields(before, after, &AUDIT_FIELDS));
        if action == AuditAction::ProductionQueueDelete {
            record.severity = Severity::Warning;
        }
        self.audit.record(record).await;
    }
}

/// Trim + 大小写不敏感去重，保留首次出现的顺序和写法
pub fn normalize_work_centers(centers: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    centers
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .filter(|c| seen.insert(c.to_lowercase()))
        .map(str::to_string)
        .collect()
}

fn audit_snapshot(queue: &ProductionQueue) -> Value {
    json!({
        "name": queue.name,
        "capacity": queue.capacity,
        "workCenters": queue.work_centers,
        "priority": queue.priority.as_str(),
        "status": queue.status.as_str(),
        "notes": queue.notes,
        "metadata": queue.metadata,
    })
}

fn parse_filter<T: PartialEq>(
    values: &[String],
    parse: fn(&str) -> Option<T>,
    field: &str,
) -> QueueResult<Vec<T>> {
    let mut parsed = Vec::new();
    for raw in values {
        let value = raw.trim().to_lowercase();
        if value.is_empty() {
            continue;
        }
        let item = parse(&value)
            .ok_or_else(|| QueueError::Invalid(format!("unknown {} filter {}", field, value)))?;
        if !parsed.contains(&item) {
            parsed.push(item);
        }
    }
    Ok(parsed)
}

fn require_actor(actor: &str) -> QueueResult<String> {
    match actor.trim() {
        "" => Err(QueueError::Invalid("actor is required".into())),
        a => Ok(a.to_string()),
    }
}

fn require_id(id: &str) -> QueueResult<String> {
    match id.trim() {
        "" => Err(QueueError::Invalid("queue id is required".into())),
        id => Ok(id.to_string()),
    }
}
