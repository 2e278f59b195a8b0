//! 时钟与 ID 生成器
//!
//! 服务从不直接调用 `Utc::now()` 或生成随机 ID，而是通过这两个 trait 注入，
//! 测试中替换为固定时钟和预设 ID 序列。

use chrono::{DateTime, Utc};

/// UTC 时间源
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 不透明唯一 ID 生成器
///
/// 只要求唯一且 URL 安全。
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> String;
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// UUIDv7 生成器（时间有序，类 ULID）
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn new_id(&self) -> String {
        shared::util::opaque_id()
    }
}

/// 导出任务默认 ID：`task_<unix nanos>`
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixedTaskIdGenerator;

impl IdGenerator for PrefixedTaskIdGenerator {
    fn new_id(&self) -> String {
        let now = Utc::now();
        let nanos = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000));
        format!("task_{}", nanos)
    }
}
