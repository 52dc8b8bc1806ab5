use crate::common::Resolution;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 规范化 K 线的列名，顺序即存储表的列顺序（不含代理主键）。
pub const CANDLE_COLUMNS: [&str; 12] = [
    "date",
    "updated",
    "market",
    "resolution",
    "open_price",
    "close_price",
    "high_price",
    "low_price",
    "volume",
    "volume_usd",
    "trades",
    "starting_interest",
];

/// # Summary
/// 单根 K 线数据实体，记录某个市场在固定周期内的 OHLCV 行情。
///
/// # Invariants
/// - `(date, market)` 在同一周期的存储中唯一；后写入者整体覆盖其余字段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    // 周期开始时间
    pub date: DateTime<Utc>,
    // 交易所报告的最后更新时间
    pub updated: DateTime<Utc>,
    // 市场代码 (例如: BTC-USD)
    pub market: String,
    // K 线周期
    pub resolution: Resolution,
    // 开盘价
    pub open_price: f64,
    // 收盘价
    pub close_price: f64,
    // 最高价
    pub high_price: f64,
    // 最低价
    pub low_price: f64,
    // 基础资产成交量
    pub volume: f64,
    // 计价资产成交量
    pub volume_usd: f64,
    // 成交笔数
    pub trades: i64,
    // 周期开始时的未平仓量
    pub starting_interest: f64,
}

/// # Summary
/// 交易所返回的原始 K 线记录。
///
/// # Invariants
/// - 数值字段保持交易所下发的十进制字符串，规范化由市场层完成。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleRecord {
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub market: String,
    pub resolution: String,
    pub low: String,
    pub high: String,
    pub open: String,
    pub close: String,
    pub base_token_volume: String,
    pub trades: String,
    pub usd_volume: String,
    pub starting_open_interest: String,
}

/// # Summary
/// 市场交易状态。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    // 可交易
    Online,
    // 其它状态，保留交易所原始字符串
    Other(String),
}

impl MarketStatus {
    /// 根据交易所状态字符串解析。
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("ONLINE") {
            MarketStatus::Online
        } else {
            MarketStatus::Other(raw.to_string())
        }
    }
}

/// # Summary
/// 可交易标的。每轮发现时重新查询，从不持久化。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketInfo {
    pub symbol: String,
    pub status: MarketStatus,
}

impl MarketInfo {
    pub fn is_online(&self) -> bool {
        self.status == MarketStatus::Online
    }
}

/// # Summary
/// 一次单市场抓取的时间窗口。
///
/// # Invariants
/// - `end` 为包含上界；抓取时会额外向前多请求一个周期以保证边界覆盖。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub resolution: Resolution,
}

impl FetchWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, resolution: Resolution) -> Self {
        Self {
            start,
            end,
            resolution,
        }
    }

    /// # Summary
    /// 以 `boundary` 为终点、向前覆盖 `count` 个完整周期的窗口。
    pub fn trailing(boundary: DateTime<Utc>, count: i32, resolution: Resolution) -> Self {
        let span = resolution.duration() * count;
        Self::new(boundary - span, boundary, resolution)
    }

    /// 窗口长度。
    pub fn span(&self) -> Duration {
        self.end - self.start
    }
}
