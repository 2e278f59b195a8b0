//! Hanko Fulfillment Core - 印章工坊订单履约核心
//!
//! # 架构概述
//!
//! 订单支付之后到出货为止的全部业务规则：
//!
//! - **生产** (`production`): 生产队列定义、WIP 汇总、看板工序与 QC
//! - **发票** (`invoicing`): 有界并发的批量开票
//! - **支付** (`payments`): Stripe webhook 入账、手动请款/退款、订单汇总
//! - **发货** (`shipments`): 发货单、数量上限、订单自动发货
//! - **导出** (`export`): 幂等的 BigQuery 同步任务提交
//!
//! 所有服务只依赖端口（trait），通过 `db::memory` 的内存实现即可完整运行。
//!
//! # 模块结构
//!
//! ```text
//! fulfillment-core/src/
//! ├── core/          # 配置、时钟/ID、后台任务
//! ├── db/            # 仓储端口、UnitOfWork、内存实现
//! ├── audit/         # 哈希链审计日志
//! ├── counters/      # 单号计数器
//! ├── events/        # 订单事件总线
//! ├── production/    # 生产队列与看板
//! ├── invoicing/     # 批量开票
//! ├── payments/      # 支付结算
//! ├── shipments/     # 发货
//! ├── export/        # 导出调度
//! ├── jobs/          # 后台 job 处理
//! ├── testing.rs     # 测试辅助
//! └── utils/         # 日志、JSON 工具
//! ```

pub mod audit;
pub mod core;
pub mod counters;
pub mod db;
pub mod events;
pub mod export;
pub mod invoicing;
pub mod jobs;
pub mod payments;
pub mod production;
pub mod shipments;
pub mod testing;
pub mod utils;

// Re-export 公共类型
pub use core::{Clock, Config, IdGenerator, SystemClock, UuidIdGenerator};
pub use db::MemoryStore;
pub use export::ExportService;
pub use invoicing::InvoiceService;
pub use payments::PaymentService;
pub use production::{ProductionBoardService, ProductionQueueService};
pub use shipments::ShipmentService;

// Re-export unified error types from shared
pub use shared::error::{AppError, AppResult, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};
