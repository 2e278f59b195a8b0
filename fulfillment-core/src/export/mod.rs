//! 导出调度模块
//!
//! - [`ExportService`] 幂等的 BigQuery 同步任务提交
//! - [`ExportJobPublisher`] 后台队列发布端口

mod error;
mod publisher;
mod service;

pub use error::{ExportError, ExportResult};
pub use publisher::{
    BigQueryExportMessage, ChannelExportPublisher, EXPORT_TOPIC, ExportJobPublisher,
    NoopExportPublisher, PublishError,
};
pub use service::{ExportService, ExportWindow, StartBigQuerySyncCommand};
