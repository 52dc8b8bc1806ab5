use crate::common::Resolution;
use crate::market::entity::{CandleRecord, MarketInfo};
use crate::market::error::MarketError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 单页请求的最大行数上限。
pub const MAX_PAGE_LIMIT: u32 = 100;

/// # Summary
/// 交易所行情数据源接口（原始数据源）。
///
/// # Invariants
/// - 每次调用恰好发起一次外部请求，不做任何重试；重试节奏由上层决定。
/// - 限流必须通过 `MarketError::Exchange { rate_limited: true, .. }` 报告。
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// # Summary
    /// 列出交易所当前挂牌的全部市场及其状态。
    ///
    /// # Returns
    /// 成功返回市场列表，失败返回 `MarketError`。
    async fn list_markets(&self) -> Result<Vec<MarketInfo>, MarketError>;

    /// # Summary
    /// 获取单个市场在 `[from, to]` 区间内的一页 K 线。
    ///
    /// # Logic
    /// 1. 构建包含周期、起止时间与页大小的请求。
    /// 2. 执行网络请求并解析为原始记录。
    ///
    /// # Arguments
    /// * `market`: 市场代码。
    /// * `resolution`: K 线周期。
    /// * `from`: 开始时间（包含）。
    /// * `to`: 结束时间（包含）。
    /// * `limit`: 页大小上限，不超过 `MAX_PAGE_LIMIT`。
    ///
    /// # Returns
    /// 按时间倒序排列的原始记录，可能为空。
    async fn fetch_candle_page(
        &self,
        market: &str,
        resolution: Resolution,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<CandleRecord>, MarketError>;
}
