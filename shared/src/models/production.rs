//! Production Model
//!
//! 生产队列定义、生产卡片（看板）以及 QC 检品子状态。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Metadata;

// ============================================================================
// Queue
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePriority {
    #[default]
    Normal,
    Rush,
}

impl QueuePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Rush => "rush",
        }
    }

    /// Case-insensitive; `None` for unknown values.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "rush" => Some(Self::Rush),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    #[default]
    Active,
    Paused,
    Archived,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// 生产队列定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionQueue {
    /// `pqu_` prefixed
    pub id: String,
    pub name: String,
    pub capacity: i64,
    /// Trimmed, case-insensitively unique, first-seen order
    #[serde(default)]
    pub work_centers: Vec<String>,
    pub priority: QueuePriority,
    pub status: QueueStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// WIP 汇总（读模型）
///
/// Ages are milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueWipSummary {
    pub queue_id: String,
    pub status_counts: BTreeMap<String, i64>,
    pub total: i64,
    pub average_age_ms: i64,
    pub oldest_age_ms: i64,
    pub sla_breach_count: i64,
    pub generated_at: DateTime<Utc>,
}

// ============================================================================
// Board
// ============================================================================

/// 看板工序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Engraving,
    Polishing,
    Qc,
    Packed,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Queued,
        Stage::Engraving,
        Stage::Polishing,
        Stage::Qc,
        Stage::Packed,
    ];

    pub fn weight(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Engraving => 1,
            Self::Polishing => 2,
            Self::Qc => 3,
            Self::Packed => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Engraving => "engraving",
            Self::Polishing => "polishing",
            Self::Qc => "qc",
            Self::Packed => "packed",
        }
    }

    /// 工序显示名
    pub fn label(&self) -> &'static str {
        match self {
            Self::Queued => "待機",
            Self::Engraving => "刻印",
            Self::Polishing => "研磨",
            Self::Qc => "検品",
            Self::Packed => "梱包",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "engraving" => Some(Self::Engraving),
            "polishing" => Some(Self::Polishing),
            "qc" => Some(Self::Qc),
            "packed" => Some(Self::Packed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardPriority {
    #[default]
    Normal,
    Rush,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Info,
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardFlag {
    pub label: String,
    pub tone: Tone,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: String,
    pub stage: Stage,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub description: String,
    pub actor: String,
    #[serde(default)]
    pub station: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<Tone>,
}

// ============================================================================
// QC
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcStatus {
    #[default]
    Pending,
    Failed,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcChecklistItem {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub passed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcIssue {
    pub id: String,
    pub reason_code: String,
    pub summary: String,
    pub actor: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcAttachment {
    pub label: String,
    pub kind: String,
    pub url: String,
}

/// 检品记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcInspection {
    pub id: String,
    pub status: QcStatus,
    #[serde(default)]
    pub checklist: Vec<QcChecklistItem>,
    #[serde(default)]
    pub issues: Vec<QcIssue>,
    #[serde(default)]
    pub attachments: Vec<QcAttachment>,
    /// Newest first
    #[serde(default)]
    pub notes: Vec<String>,
    pub received_at: DateTime<Utc>,
}

/// 生产卡片
///
/// Timeline is newest-first; `last_event` mirrors `timeline[0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionCard {
    pub id: String,
    pub order_id: String,
    pub order_number: String,
    pub stage: Stage,
    pub priority: CardPriority,
    pub queue_id: String,
    #[serde(default)]
    pub workstation: String,
    #[serde(default)]
    pub flags: Vec<CardFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event: Option<TimelineEvent>,
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection: Option<QcInspection>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductionCard {
    pub fn has_flag(&self, label: &str) -> bool {
        self.flags.iter().any(|f| f.label == label)
    }

    /// Add a flag unless one with the same label exists
    pub fn add_flag(&mut self, flag: CardFlag) {
        if !self.has_flag(&flag.label) {
            self.flags.push(flag);
        }
    }

    pub fn remove_flag(&mut self, label: &str) {
        self.flags.retain(|f| f.label != label);
    }

    /// Append a note unless already present
    pub fn push_note(&mut self, note: &str) {
        let note = note.trim();
        if !note.is_empty() && !self.notes.iter().any(|n| n == note) {
            self.notes.push(note.to_string());
        }
    }
}
