use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 某市场在存储中的数据覆盖范围。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketExtent {
    // 市场代码
    pub market: String,
    // 最早一根 K 线的时间
    pub first_candle: DateTime<Utc>,
    // 最晚一根 K 线的时间
    pub last_candle: DateTime<Utc>,
}
