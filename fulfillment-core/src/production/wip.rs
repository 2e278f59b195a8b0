//! WIP 汇总规范化与队列深度记录
//!
//! 仓储返回的原始汇总经 [`normalize_wip_summary`] 清洗后，
//! 交给 [`QueueDepthRecorder`]（指标钩子）。

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;

use shared::models::QueueWipSummary;

/// 规范化 WIP 汇总
///
/// - 状态键：trim + 小写 + 空格/`-` → `_`，重复键求和，负数归零
/// - 有状态计数时 total 取计数之和
/// - 负年龄归零；队列 id 为空时沿用请求 id
pub fn normalize_wip_summary(request_id: &str, raw: QueueWipSummary) -> QueueWipSummary {
    let mut status_counts: BTreeMap<String, i64> = BTreeMap::new();
    for (key, count) in raw.status_counts {
        let key = normalize_status_key(&key);
        if key.is_empty() {
            continue;
        }
        *status_counts.entry(key).or_insert(0) += count.max(0);
    }

    let total = if status_counts.is_empty() {
        raw.total.max(0)
    } else {
        status_counts.values().sum()
    };

    let queue_id = match raw.queue_id.trim() {
        "" => request_id.trim().to_string(),
        id => id.to_string(),
    };

    QueueWipSummary {
        queue_id,
        status_counts,
        total,
        average_age_ms: raw.average_age_ms.max(0),
        oldest_age_ms: raw.oldest_age_ms.max(0),
        sla_breach_count: raw.sla_breach_count.max(0),
        generated_at: raw.generated_at.with_timezone(&Utc),
    }
}

fn normalize_status_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

// ============================================================================
// Recorder
// ============================================================================

/// 队列深度指标钩子
pub trait QueueDepthRecorder: Send + Sync {
    fn record(&self, summary: &QueueWipSummary);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopQueueDepthRecorder;

impl QueueDepthRecorder for NoopQueueDepthRecorder {
    fn record(&self, _summary: &QueueWipSummary) {}
}

/// 每个队列保留最新快照，读取时丢弃过期快照
#[derive(Debug)]
pub struct SnapshotQueueDepthRecorder {
    snapshots: DashMap<String, QueueWipSummary>,
    stale_after: chrono::Duration,
}

impl Default for SnapshotQueueDepthRecorder {
    fn default() -> Self {
        Self::new(chrono::Duration::minutes(5))
    }
}

impl SnapshotQueueDepthRecorder {
    pub fn new(stale_after: chrono::Duration) -> Self {
        Self {
            snapshots: DashMap::new(),
            stale_after,
        }
    }

    /// 最新且未过期的快照
    pub fn latest(&self, queue_id: &str, now: DateTime<Utc>) -> Option<QueueWipSummary> {
        let fresh = self
            .snapshots
            .get(queue_id)
            .map(|s| (now - s.generated_at <= self.stale_after, s.clone()))?;
        match fresh {
            (true, summary) => Some(summary),
            (false, _) => {
                self.snapshots.remove(queue_id);
                None
            }
        }
    }

    /// 所有未过期快照的 total 之和
    pub fn total_depth(&self, now: DateTime<Utc>) -> i64 {
        self.snapshots.retain(|_, s| now - s.generated_at <= self.stale_after);
        self.snapshots.iter().map(|s| s.total).sum()
    }
}

impl QueueDepthRecorder for SnapshotQueueDepthRecorder {
    fn record(&self, summary: &QueueWipSummary) {
        tracing::info!(
            queue_id = %summary.queue_id,
            total = summary.total,
            sla_breach_count = summary.sla_breach_count,
            oldest_age_ms = summary.oldest_age_ms,
            "production_queue.wip.recorded"
        );
        self.snapshots
            .insert(summary.queue_id.clone(), summary.clone());
    }
}
