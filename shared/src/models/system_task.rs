//! System Task Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Metadata;

pub const TASK_KIND_BIGQUERY_EXPORT: &str = "export.bigquery";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemTaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

/// Background task record; status transitions happen outside the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemTask {
    pub id: String,
    pub kind: String,
    pub status: SystemTaskStatus,
    pub requested_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub parameters: Metadata,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}
