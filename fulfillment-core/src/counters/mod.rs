//! 计数器服务
//!
//! 按 `scope:name` 分配单调递增的格式化编号。
//!
//! | 用途 | scope | name | 格式 |
//! |------|-------|------|------|
//! | 订单号 | `orders` | `YYYYMMDD` | `HF-YYYYMMDD-NNNN` |
//! | 发票号 | `invoices` | `YYYYMM` | `INV-YYYYMM-NNNNNN` |

mod memory;

pub use memory::MemoryCounterService;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use shared::error::{AppError, ErrorCode};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CounterError {
    #[error("invalid counter request: {0}")]
    InvalidInput(String),

    #[error("counter {0} exhausted")]
    Exhausted(String),

    #[error("counter unavailable: {0}")]
    Unavailable(String),
}

pub type CounterResult<T> = Result<T, CounterError>;

impl From<CounterError> for AppError {
    fn from(err: CounterError) -> Self {
        let code = match &err {
            CounterError::InvalidInput(_) => ErrorCode::ValidationFailed,
            CounterError::Exhausted(_) => ErrorCode::CounterExhausted,
            CounterError::Unavailable(_) => ErrorCode::DependencyUnavailable,
        };
        AppError::with_message(code, err.to_string())
    }
}

/// 自定义格式化函数：(时间, 值) → 编号
pub type CounterFormatter = Arc<dyn Fn(DateTime<Utc>, i64) -> String + Send + Sync>;

#[derive(Clone)]
pub struct CounterOptions {
    pub step: i64,
    pub max_value: Option<i64>,
    /// First allocated value is `initial_value + step`
    pub initial_value: Option<i64>,
    pub prefix: String,
    pub suffix: String,
    pub pad_length: usize,
    pub formatter: Option<CounterFormatter>,
}

impl Default for CounterOptions {
    fn default() -> Self {
        Self {
            step: 1,
            max_value: None,
            initial_value: None,
            prefix: String::new(),
            suffix: String::new(),
            pad_length: 0,
            formatter: None,
        }
    }
}

impl fmt::Debug for CounterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterOptions")
            .field("step", &self.step)
            .field("max_value", &self.max_value)
            .field("initial_value", &self.initial_value)
            .field("prefix", &self.prefix)
            .field("suffix", &self.suffix)
            .field("pad_length", &self.pad_length)
            .field("formatter", &self.formatter.is_some())
            .finish()
    }
}

impl CounterOptions {
    /// Formatter wins over prefix/pad/suffix
    pub fn format(&self, at: DateTime<Utc>, value: i64) -> String {
        match &self.formatter {
            Some(formatter) => formatter(at, value),
            None => format!(
                "{}{:0width$}{}",
                self.prefix,
                value,
                self.suffix,
                width = self.pad_length
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterValue {
    pub value: i64,
    pub formatted: String,
}

#[async_trait]
pub trait CounterService: Send + Sync {
    async fn next(&self, scope: &str, name: &str, options: CounterOptions)
    -> CounterResult<CounterValue>;

    /// `HF-YYYYMMDD-NNNN`
    async fn next_order_number(&self) -> CounterResult<String>;

    /// `INV-YYYYMM-NNNNNN`
    async fn next_invoice_number(&self) -> CounterResult<String>;
}

/// 订单号计数器参数
pub fn order_number_options(at: DateTime<Utc>) -> (String, CounterOptions) {
    let day = at.format("%Y%m%d").to_string();
    let options = CounterOptions {
        prefix: format!("HF-{}-", day),
        pad_length: 4,
        ..Default::default()
    };
    (day, options)
}

/// 发票号计数器参数
pub fn invoice_number_options(at: DateTime<Utc>) -> (String, CounterOptions) {
    let month = at.format("%Y%m").to_string();
    let options = CounterOptions {
        prefix: format!("INV-{}-", month),
        pad_length: 6,
        ..Default::default()
    };
    (month, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_format_pads() {
        let at = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        let (name, options) = invoice_number_options(at);
        assert_eq!(name, "202505");
        assert_eq!(options.format(at, 1), "INV-202505-000001");

        let (name, options) = order_number_options(at);
        assert_eq!(name, "20250501");
        assert_eq!(options.format(at, 1007), "HF-20250501-1007");
    }

    #[test]
    fn test_custom_formatter() {
        let at = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        let options = CounterOptions {
            formatter: Some(Arc::new(|at: DateTime<Utc>, v| format!("{}-{}", at.format("%y"), v))),
            ..Default::default()
        };
        assert_eq!(options.format(at, 9), "25-9");
    }
}
