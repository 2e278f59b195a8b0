//! 工具模块
//!
//! - 日志初始化
//! - JSON 宽松取值（处理器 payload 中数字/字符串/对象混用）

pub mod json;
pub mod logger;

pub use logger::{init_logger, init_logger_with_file};
