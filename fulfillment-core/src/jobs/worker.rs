//! Job Worker
//!
//! 从 mpsc 通道消费 [`JobMessage`]，瞬时失败按指数退避（带抖动）重试。
//! 通道关闭时退出；收到 shutdown 信号时先把缓冲中的消息各投递一次再退出。

use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{JobError, JobMessage, JobProcessor, JobResult};

/// Max delivery attempts per message
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Initial retry delay
const DEFAULT_INITIAL_DELAY_MS: u64 = 500;
/// Retry delay ceiling
const DEFAULT_MAX_DELAY_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次失败后的等待时间（1-based），附加最多 25% 抖动
    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let base = self.initial_delay.saturating_mul(factor).min(self.max_delay);
        let jitter_ms = (base.as_millis() / 4) as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

pub struct JobWorker {
    name: &'static str,
    processor: Arc<dyn JobProcessor>,
    retry: RetryPolicy,
}

impl JobWorker {
    pub fn new(name: &'static str, processor: Arc<dyn JobProcessor>) -> Self {
        Self {
            name,
            processor,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 运行 worker（阻塞直到通道关闭或取消）
    pub async fn run(self, mut rx: mpsc::Receiver<JobMessage>, shutdown: CancellationToken) {
        tracing::info!(worker = self.name, "Job worker started");

        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => {
                    // 已入队的消息各投递一次，不再重试
                    rx.close();
                    let mut drained = 0usize;
                    while let Ok(message) = rx.try_recv() {
                        self.deliver(message, &shutdown).await;
                        drained += 1;
                    }
                    tracing::info!(worker = self.name, drained, "Job worker received shutdown signal");
                    break;
                }
                message = rx.recv() => message,
            };
            let Some(message) = message else {
                tracing::info!(worker = self.name, "Job channel closed, worker stopping");
                break;
            };
            self.deliver(message, &shutdown).await;
        }
    }

    /// Pending retries are abandoned once shutdown is signalled
    async fn deliver(&self, mut message: JobMessage, shutdown: &CancellationToken) {
        loop {
            message.delivery_attempt += 1;
            let attempt = message.delivery_attempt;
            match self.processor.process(&message).await {
                Ok(()) => return,
                Err(JobError::Permanent(reason)) => {
                    tracing::warn!(
                        worker = self.name,
                        message_id = %message.id,
                        attempt,
                        "Dropping job after permanent failure: {reason}"
                    );
                    return;
                }
                Err(JobError::Transient(reason)) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        worker = self.name,
                        message_id = %message.id,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Job attempt failed, retrying: {reason}"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            tracing::warn!(worker = self.name, message_id = %message.id, "Retry abandoned on shutdown");
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(JobError::Transient(reason)) => {
                    tracing::error!(
                        worker = self.name,
                        message_id = %message.id,
                        attempt,
                        "Job retries exhausted: {reason}"
                    );
                    return;
                }
            }
        }
    }
}

/// 按 `topic` 属性把消息分发给已注册的处理器
#[derive(Default, Clone)]
pub struct JobRouter {
    routes: HashMap<String, Arc<dyn JobProcessor>>,
}

impl JobRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, topic: impl Into<String>, processor: Arc<dyn JobProcessor>) -> Self {
        self.routes.insert(topic.into(), processor);
        self
    }

    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }
}

#[async_trait]
impl JobProcessor for JobRouter {
    async fn process(&self, message: &JobMessage) -> JobResult<()> {
        let topic = message
            .topic()
            .ok_or_else(|| JobError::Permanent(format!("message {} has no topic", message.id)))?;
        let processor = self
            .routes
            .get(topic)
            .ok_or_else(|| JobError::Permanent(format!("no processor for topic {topic}")))?;
        processor.process(message).await
    }
}
