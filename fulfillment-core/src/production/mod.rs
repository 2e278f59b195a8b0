//! 生产模块
//!
//! - [`ProductionQueueService`] 队列定义 CRUD + WIP 读模型
//! - [`ProductionBoardService`] 看板工序移动与 QC 状态机
//! - [`QueueDepthRecorder`] WIP 指标钩子

pub mod board;
pub mod catalog;
pub mod error;
pub mod queue_service;
pub mod wip;

pub use board::{
    AdmitCardInput, AppendEventInput, BoardLane, FLAG_QC_RECHECK, FLAG_REWORK,
    ProductionBoardService, QcDecisionInput, ReworkInput,
};
pub use catalog::{QC_REASONS, QcReason, REWORK_ROUTES, ReworkRoute};
pub use error::{BoardError, BoardResult, QueueError, QueueResult};
pub use queue_service::{ProductionQueueService, QueueInput, QueueListRequest};
pub use wip::{
    NoopQueueDepthRecorder, QueueDepthRecorder, SnapshotQueueDepthRecorder, normalize_wip_summary,
};
