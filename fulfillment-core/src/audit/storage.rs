//! 审计日志内存存储
//!
//! Append-only，没有任何删除/更新接口。
//! SHA256 哈希链确保防篡改。

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::AuditLogService;
use super::types::{AuditEntry, AuditLogRecord, AuditQuery};

const GENESIS_HASH: &str = "genesis";

/// 审计日志存储（进程内）
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条审计记录，返回带哈希的条目
    pub fn append(&self, record: AuditLogRecord) -> AuditEntry {
        let mut entries = self.entries.lock();
        let (sequence, prev_hash) = match entries.last() {
            Some(last) => (last.sequence + 1, last.curr_hash.clone()),
            None => (1, GENESIS_HASH.to_string()),
        };
        let curr_hash = compute_audit_hash(&prev_hash, sequence, &record);
        let entry = AuditEntry {
            sequence,
            record,
            prev_hash,
            curr_hash,
        };
        entries.push(entry.clone());
        entry
    }

    /// 按条件查询（倒序，最新在前）
    pub fn query(&self, q: &AuditQuery) -> Vec<AuditEntry> {
        let entries = self.entries.lock();
        let limit = q.limit.unwrap_or(usize::MAX);
        entries
            .iter()
            .rev()
            .filter(|e| q.action.is_none_or(|a| e.record.action == a))
            .filter(|e| q.actor.as_deref().is_none_or(|a| e.record.actor == a))
            .filter(|e| {
                q.target_ref
                    .as_deref()
                    .is_none_or(|t| e.record.target_ref == t)
            })
            .take(limit)
            .cloned()
            .collect()
    }

    /// 按写入顺序返回全部记录
    pub fn records(&self) -> Vec<AuditLogRecord> {
        self.entries.lock().iter().map(|e| e.record.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// 重新计算整条链；返回第一条不匹配的序列号
    pub fn verify_chain(&self) -> Result<(), u64> {
        let entries = self.entries.lock();
        let mut prev = GENESIS_HASH.to_string();
        for entry in entries.iter() {
            if entry.prev_hash != prev
                || compute_audit_hash(&prev, entry.sequence, &entry.record) != entry.curr_hash
            {
                return Err(entry.sequence);
            }
            prev = entry.curr_hash.clone();
        }
        Ok(())
    }

    #[cfg(test)]
    fn tamper(&self, sequence: u64, actor: &str) {
        let mut entries = self.entries.lock();
        if let Some(e) = entries.iter_mut().find(|e| e.sequence == sequence) {
            e.record.actor = actor.to_string();
        }
    }
}

#[async_trait]
impl AuditLogService for MemoryAuditLog {
    async fn record(&self, record: AuditLogRecord) {
        let entry = self.append(record);
        tracing::debug!(
            sequence = entry.sequence,
            action = %entry.record.action,
            target = %entry.record.target_ref,
            "Audit entry recorded"
        );
    }
}

/// 计算审计条目的 SHA256 哈希
///
/// - 变长字段间用 `\x00` 分隔，防止 `("ab","cd")` 与 `("abc","d")` 碰撞
/// - 定长字段用 LE 字节序
/// - Optional 字段用 `\x00`=None / `\x01`+bytes=Some 区分
fn compute_audit_hash(prev_hash: &str, sequence: u64, record: &AuditLogRecord) -> String {
    let mut hasher = Sha256::new();

    hasher.update(prev_hash.as_bytes());
    hasher.update(b"\x00");
    hasher.update(sequence.to_le_bytes());
    hasher.update(record.occurred_at.timestamp_micros().to_le_bytes());

    hasher.update(record.action.as_str().as_bytes());
    hasher.update(b"\x00");
    hasher.update(record.actor.as_bytes());
    hasher.update(b"\x00");
    hasher.update(record.target_ref.as_bytes());
    hasher.update(b"\x00");
    hash_optional(&mut hasher, record.request_id.as_deref());

    // Map/BTreeMap 序列化顺序稳定
    let metadata = serde_json::to_string(&record.metadata).unwrap_or_default();
    hasher.update(metadata.as_bytes());
    hasher.update(b"\x00");
    let diff = serde_json::to_string(&record.diff).unwrap_or_default();
    hasher.update(diff.as_bytes());
    hasher.update(b"\x00");

    hex::encode(hasher.finalize())
}

fn hash_optional(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(v) => {
            hasher.update(b"\x01");
            hasher.update(v.as_bytes());
        }
        None => hasher.update(b"\x00"),
    }
    hasher.update(b"\x00");
}
