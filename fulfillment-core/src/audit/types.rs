//! 审计日志类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use shared::models::Metadata;

/// 审计操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    // ═══ 生产队列 ═══
    #[serde(rename = "production_queue.create")]
    ProductionQueueCreate,
    #[serde(rename = "production_queue.update")]
    ProductionQueueUpdate,
    #[serde(rename = "production_queue.delete")]
    ProductionQueueDelete,

    // ═══ 生产看板 ═══
    #[serde(rename = "production_card.admit")]
    ProductionCardAdmit,
    #[serde(rename = "production_card.event")]
    ProductionCardEvent,
    #[serde(rename = "production_card.qc_pass")]
    ProductionCardQcPass,
    #[serde(rename = "production_card.qc_fail")]
    ProductionCardQcFail,
    #[serde(rename = "production_card.qc_rework")]
    ProductionCardQcRework,

    // ═══ 支付 ═══
    #[serde(rename = "payments.manual_capture")]
    PaymentManualCapture,
    #[serde(rename = "payments.manual_refund")]
    PaymentManualRefund,

    // ═══ 发票 ═══
    #[serde(rename = "invoices.batch_issue")]
    InvoiceBatchIssue,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProductionQueueCreate => "production_queue.create",
            Self::ProductionQueueUpdate => "production_queue.update",
            Self::ProductionQueueDelete => "production_queue.delete",
            Self::ProductionCardAdmit => "production_card.admit",
            Self::ProductionCardEvent => "production_card.event",
            Self::ProductionCardQcPass => "production_card.qc_pass",
            Self::ProductionCardQcFail => "production_card.qc_fail",
            Self::ProductionCardQcRework => "production_card.qc_rework",
            Self::PaymentManualCapture => "payments.manual_capture",
            Self::PaymentManualRefund => "payments.manual_refund",
            Self::InvoiceBatchIssue => "invoices.batch_issue",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    #[default]
    Staff,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

/// 字段变更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub before: Value,
    pub after: Value,
}

/// 字段名 → 变更
pub type AuditDiff = BTreeMap<String, FieldChange>;

/// 一条审计记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogRecord {
    pub actor: String,
    pub actor_type: ActorType,
    pub action: AuditAction,
    /// e.g. `/production-queues/pqu_x`, `/orders/o/payments/p`
    pub target_ref: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// SHA-256 of the client IP, never the raw address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub diff: AuditDiff,
    pub occurred_at: DateTime<Utc>,
}

impl AuditLogRecord {
    /// Staff action with info severity
    pub fn staff(
        actor: impl Into<String>,
        action: AuditAction,
        target_ref: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            actor: actor.into(),
            actor_type: ActorType::Staff,
            action,
            target_ref: target_ref.into(),
            severity: Severity::Info,
            request_id: None,
            ip_hash: None,
            user_agent: None,
            metadata: Metadata::new(),
            diff: AuditDiff::new(),
            occurred_at,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_diff(mut self, diff: AuditDiff) -> Self {
        self.diff = diff;
        self
    }
}

/// 已存储的审计条目（含哈希链）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// 全局递增序列号（从 1 开始）
    pub sequence: u64,
    pub record: AuditLogRecord,
    /// 上一条的哈希（首条为 "genesis"）
    pub prev_hash: String,
    pub curr_hash: String,
}

/// 审计查询参数
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub action: Option<AuditAction>,
    pub actor: Option<String>,
    pub target_ref: Option<String>,
    pub limit: Option<usize>,
}
