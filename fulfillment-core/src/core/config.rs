/// 运行配置 - 履约核心的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖（启动时先加载 `.env`）：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | FULFILLMENT_ENV | development | 运行环境 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_JSON | false | JSON 日志输出 |
/// | LOG_DIR | (未设置) | 滚动日志目录 |
/// | INVOICE_DEFAULT_LIMIT | 50 | 发票批次默认上限 |
/// | INVOICE_MAX_LIMIT | 200 | 发票批次最大上限 |
/// | INVOICE_WORKERS | 5 | 发票并发 worker 上限 |
/// | INVOICE_STORAGE_DIR | (未设置) | 本地发票存储目录 |
/// | AUDIT_BUFFER_SIZE | 1024 | 审计通道容量 |
/// | EVENT_BUS_CAPACITY | 256 | 事件总线广播容量 |
/// | QUEUE_SLA_HOURS | 72 | 无交期卡片的 SLA 小时数 |
/// | JOB_CHANNEL_CAPACITY | 64 | 后台 job 通道容量 |
///
/// # 示例
///
/// ```ignore
/// INVOICE_WORKERS=3 LOG_JSON=true cargo run --bin fulfillment-worker
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 运行环境: development | staging | production
    pub environment: String,
    /// 日志级别
    pub log_level: String,
    /// 是否输出 JSON 日志
    pub log_json: bool,
    /// 日志目录（设置后按天滚动写文件）
    pub log_dir: Option<String>,
    /// 发票批次配置
    pub invoice: InvoiceSettings,
    /// 本地发票存储目录
    pub invoice_storage_dir: Option<String>,
    /// 审计通道容量
    pub audit_buffer_size: usize,
    /// 事件总线广播容量
    pub event_bus_capacity: usize,
    /// 无交期卡片的 SLA（小时）
    pub queue_sla_hours: i64,
    /// 后台 job 通道容量
    pub job_channel_capacity: usize,
}

/// 发票批次配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceSettings {
    pub default_limit: usize,
    pub max_limit: usize,
    pub workers: usize,
}

impl Default for InvoiceSettings {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 200,
            workers: 5,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// 加载 `.env` 后从环境变量读取
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        Self::from_env()
    }

    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        let defaults = InvoiceSettings::default();
        let max_limit = env_parse("INVOICE_MAX_LIMIT")
            .filter(|v: &usize| *v > 0)
            .unwrap_or(defaults.max_limit);
        let default_limit = env_parse("INVOICE_DEFAULT_LIMIT")
            .filter(|v: &usize| *v > 0)
            .unwrap_or(defaults.default_limit)
            .min(max_limit);

        Self {
            environment: std::env::var("FULFILLMENT_ENV").unwrap_or_else(|_| "development".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_parse("LOG_JSON").unwrap_or(false),
            log_dir: std::env::var("LOG_DIR").ok().filter(|v| !v.trim().is_empty()),
            invoice: InvoiceSettings {
                default_limit,
                max_limit,
                workers: env_parse("INVOICE_WORKERS")
                    .filter(|v: &usize| *v > 0)
                    .unwrap_or(defaults.workers),
            },
            invoice_storage_dir: std::env::var("INVOICE_STORAGE_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            audit_buffer_size: env_parse("AUDIT_BUFFER_SIZE").unwrap_or(1024),
            event_bus_capacity: env_parse("EVENT_BUS_CAPACITY").unwrap_or(256),
            queue_sla_hours: env_parse("QUEUE_SLA_HOURS").unwrap_or(72),
            job_channel_capacity: env_parse("JOB_CHANNEL_CAPACITY").unwrap_or(64),
        }
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_defaults() {
        let settings = InvoiceSettings::default();
        assert_eq!(settings.default_limit, 50);
        assert_eq!(settings.max_limit, 200);
        assert_eq!(settings.workers, 5);
    }
}
