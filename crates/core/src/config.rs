use crate::common::Resolution;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    // REST 接口根地址
    pub base_url: String,
    // 单次请求超时（秒）
    pub timeout_secs: u64,
    // 单页行数上限
    pub page_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    // PostgreSQL 连接串
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

/// # Summary
/// 采集任务配置，显式传入 `backfill` / `run_forever`。
///
/// # Invariants
/// - `table_name` 必须是合法的 SQL 标识符，由存储层校验。
/// - `markets` 为空时表示每轮重新发现全部在线市场。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    // 目标表名
    pub table_name: String,
    // 历史导入的起点
    pub historical_start: DateTime<Utc>,
    // 启动时是否导入历史数据
    pub import_historical_on_start: bool,
    // 导入前是否清空已有数据
    pub delete_existing_on_import: bool,
    // K 线周期
    pub resolution: Resolution,
    // 轮询周期（秒）
    pub poll_interval_secs: u64,
    // 固定的市场列表
    pub markets: Vec<String>,
    // 若设置，则按成交额只保留前 N 个市场
    pub top_markets: Option<usize>,
    // 成交额排名的回看天数
    pub volume_lookback_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    // 日志文件目录，为空时只输出到终端
    pub dir: Option<String>,
    pub file_prefix: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.dydx.exchange".to_string(),
            timeout_secs: 10,
            page_limit: 100,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/dydx_data".to_string(),
            max_connections: 4,
            acquire_timeout_secs: 30,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: Some("data".to_string()),
            file_prefix: "candlekeep.log".to_string(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            table_name: "dydx_candles".to_string(),
            historical_start: Utc
                .with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            import_historical_on_start: false,
            delete_existing_on_import: false,
            resolution: Resolution::Hour1,
            poll_interval_secs: 3600,
            markets: Vec::new(),
            top_markets: None,
            volume_lookback_days: 30,
        }
    }
}
