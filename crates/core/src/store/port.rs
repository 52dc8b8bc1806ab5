use super::entity::MarketExtent;
use super::error::StoreError;
use crate::market::entity::Candle;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// # Summary
/// K 线存储接口，负责按 `(date, market)` 幂等写入与读取。
///
/// # Invariants
/// - `upsert_candles` 对读者而言要么整批可见，要么完全不可见。
/// - 重复写入同一 `(date, market)` 只更新，不新增。
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// # Summary
    /// 批量写入 K 线，已存在的 `(date, market)` 原地更新，其余插入。
    ///
    /// # Logic
    /// 1. 读取目标表列顺序。
    /// 2. 创建连接级临时暂存表并批量装载。
    /// 3. 以 `ON CONFLICT (date, market) DO UPDATE` 合并到目标表。
    ///
    /// # Arguments
    /// * `table`: 目标表名。
    /// * `candles`: 待写入数据。
    ///
    /// # Returns
    /// 成功返回受影响的行数，失败返回 `StoreError`。
    async fn upsert_candles(&self, table: &str, candles: &[Candle]) -> Result<u64, StoreError>;

    /// # Summary
    /// 创建 K 线表及 `(date, market)` 唯一索引（若不存在）。
    async fn ensure_schema(&self, table: &str) -> Result<(), StoreError>;

    /// # Summary
    /// 按市场统计已存数据的起止时间。
    async fn market_extents(&self, table: &str) -> Result<Vec<MarketExtent>, StoreError>;

    /// # Summary
    /// 清空表并重置代理主键序列。
    async fn truncate(&self, table: &str) -> Result<(), StoreError>;

    /// # Summary
    /// 加载指定市场在 `[start, end]` 内的 K 线。
    ///
    /// # Returns
    /// 按 `date`、`market` 升序排列的 K 线列表。
    async fn load_candles(
        &self,
        table: &str,
        markets: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, StoreError>;
}
