use crate::series::{SeriesFetcher, SeriesStatus};
use candlekeep_core::common::Resolution;
use candlekeep_core::common::time::{TimeProvider, align_down};
use candlekeep_core::market::entity::FetchWindow;
use candlekeep_core::market::error::MarketError;
use candlekeep_core::market::port::CandleSource;
use chrono::Duration;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

/// # Summary
/// 市场发现服务：列出可交易市场，并可按成交额筛选关注列表。
pub struct MarketDiscovery {
    source: Arc<dyn CandleSource>,
    fetcher: Arc<SeriesFetcher>,
    clock: Arc<dyn TimeProvider>,
}

impl MarketDiscovery {
    pub fn new(
        source: Arc<dyn CandleSource>,
        fetcher: Arc<SeriesFetcher>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            source,
            fetcher,
            clock,
        }
    }

    /// # Summary
    /// 当前处于可交易状态的市场代码，升序且无重复。
    pub async fn list_online_markets(&self) -> Result<Vec<String>, MarketError> {
        let mut symbols: Vec<String> = self
            .source
            .list_markets()
            .await?
            .into_iter()
            .filter(|m| m.is_online())
            .map(|m| m.symbol)
            .collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }

    /// # Summary
    /// 按回看期内的成交额 `Σ(volume × close_price)` 选出前 `n` 个在线市场。
    ///
    /// # Logic
    /// 1. 列出在线市场。
    /// 2. 以日线窗口 `[今日零点 - lookback_days, 今日零点]` 逐个串行抓取，控制请求压力。
    /// 3. 只对 `[start, end)` 内的日线计算成交额；抓取失败的市场记为 0 并告警。
    /// 4. 按成交额降序取前 `n` 个，再按字母序返回。
    ///
    /// # Arguments
    /// * `n`: 保留的市场数量。
    /// * `lookback_days`: 回看天数。
    ///
    /// # Returns
    /// 升序排列的市场代码；列出市场失败时返回 `MarketError`。
    pub async fn top_markets_by_volume(
        &self,
        n: usize,
        lookback_days: u32,
    ) -> Result<Vec<String>, MarketError> {
        let online = self.list_online_markets().await?;
        let end = align_down(self.clock.now(), Resolution::Day1.seconds());
        let window = FetchWindow::new(
            end - Duration::days(i64::from(lookback_days)),
            end,
            Resolution::Day1,
        );

        let mut scored = Vec::with_capacity(online.len());
        for market in online {
            let fetch = self.fetcher.fetch(&market, window).await;
            if let SeriesStatus::Failed(reason) = &fetch.status {
                warn!("Volume ranking: {} scored 0 ({})", market, reason);
            }
            // 只统计已收盘的回看期内日线，排除回溯补页与当日未收盘的日线
            let turnover: f64 = fetch
                .candles
                .iter()
                .filter(|c| c.date >= window.start && c.date < window.end)
                .map(|c| c.volume * c.close_price)
                .sum();
            scored.push((market, turnover));
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        let mut top: Vec<String> = scored.into_iter().take(n).map(|(m, _)| m).collect();
        top.sort();

        info!("Top {} markets by volume over {} days: {:?}", n, lookback_days, top);
        Ok(top)
    }
}
