//! 核心模块 - 配置、时钟/ID 注入、后台任务
//!
//! # 模块结构
//!
//! - [`Config`] - 运行配置（环境变量）
//! - [`Clock`] / [`IdGenerator`] - 注入的时间源和 ID 生成器
//! - [`BackgroundTasks`] - 后台任务管理

pub mod clock;
pub mod config;
pub mod tasks;

pub use clock::{Clock, IdGenerator, PrefixedTaskIdGenerator, SystemClock, UuidIdGenerator};
pub use config::{Config, InvoiceSettings};
pub use tasks::{BackgroundTasks, TaskKind};
