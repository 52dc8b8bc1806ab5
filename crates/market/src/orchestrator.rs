use crate::budget::{self, FetchMode};
use crate::series::{SeriesFetch, SeriesFetcher, SeriesStatus};
use candlekeep_core::market::entity::{Candle, FetchWindow};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// # Summary
/// 多市场抓取的合并结果。
///
/// # Invariants
/// - `candles` 按 `date`（相同时按 `market`）升序排列。
/// - `statuses` 对输入列表中的每个市场恰有一项。
#[derive(Debug, Clone, Default)]
pub struct MarketBatch {
    pub candles: Vec<Candle>,
    pub statuses: BTreeMap<String, SeriesStatus>,
}

impl MarketBatch {
    /// 抓取失败的市场列表。
    pub fn failed_markets(&self) -> Vec<&str> {
        self.statuses
            .iter()
            .filter(|(_, s)| matches!(s, SeriesStatus::Failed(_)))
            .map(|(m, _)| m.as_str())
            .collect()
    }
}

/// # Summary
/// 多市场编排器，根据限流预算选择并发或串行抓取，并合并结果。
///
/// # Invariants
/// - 结果表只存在于单次调用内，调用之间不共享任何可变状态。
/// - 必须等待全部市场完成后才合并，不提前返回部分结果。
pub struct Orchestrator {
    fetcher: Arc<SeriesFetcher>,
}

impl Orchestrator {
    pub fn new(fetcher: Arc<SeriesFetcher>) -> Self {
        Self { fetcher }
    }

    /// # Summary
    /// 抓取多个市场在同一窗口内的 K 线并合并。
    ///
    /// # Logic
    /// 1. 去除重复的市场代码，保留首次出现的顺序。
    /// 2. 按窗口计算每市场页数；只需一页时并发，否则串行。
    /// 3. 收集每个市场的结果与状态，失败市场贡献空序列。
    /// 4. 合并后按 `date` 升序排序。
    ///
    /// # Arguments
    /// * `markets`: 市场代码列表。
    /// * `window`: 所有市场共享的抓取窗口。
    ///
    /// # Returns
    /// 合并后的批次；市场列表为空时返回空批次。
    pub async fn fetch_all(&self, markets: &[String], window: FetchWindow) -> MarketBatch {
        let mut seen = HashSet::new();
        let markets: Vec<String> = markets
            .iter()
            .filter(|m| seen.insert(m.as_str()))
            .cloned()
            .collect();
        if markets.is_empty() {
            return MarketBatch::default();
        }

        let budget = budget::plan(&window, self.fetcher.page_limit());
        info!(
            "Fetching {} markets [{} .. {}] {}: {} page(s) per market, {:?}",
            markets.len(),
            window.start,
            window.end,
            window.resolution,
            budget.pages_per_market,
            budget.mode
        );

        let mut results = match budget.mode {
            FetchMode::Concurrent => self.fetch_concurrent(&markets, window).await,
            FetchMode::Serial => self.fetch_serial(&markets, window).await,
        };

        let mut batch = MarketBatch::default();
        for market in markets {
            match results.remove(&market) {
                Some(fetch) => {
                    batch.candles.extend(fetch.candles);
                    batch.statuses.insert(market, fetch.status);
                }
                None => {
                    batch.statuses.insert(
                        market,
                        SeriesStatus::Failed("fetch task did not complete".to_string()),
                    );
                }
            }
        }
        batch
            .candles
            .sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.market.cmp(&b.market)));
        batch
    }

    /// # Summary
    /// 每个市场一个 tokio 任务并发抓取。
    ///
    /// # Logic
    /// 1. 创建仅属于本次调用的结果表，以互斥锁保护写入。
    /// 2. 每个任务只写入自己的市场键一次。
    /// 3. 等待全部任务结束；崩溃的任务记录日志，其市场视为失败。
    async fn fetch_concurrent(
        &self,
        markets: &[String],
        window: FetchWindow,
    ) -> HashMap<String, SeriesFetch> {
        let results: Arc<Mutex<HashMap<String, SeriesFetch>>> =
            Arc::new(Mutex::new(HashMap::with_capacity(markets.len())));

        let handles = markets.iter().map(|market| {
            let fetcher = self.fetcher.clone();
            let results = results.clone();
            let market = market.clone();
            tokio::spawn(async move {
                let fetch = fetcher.fetch(&market, window).await;
                results
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(market, fetch);
            })
        });

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                error!("Market fetch task failed: {}", e);
            }
        }

        std::mem::take(&mut *results.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// 按列表顺序逐个抓取。
    async fn fetch_serial(
        &self,
        markets: &[String],
        window: FetchWindow,
    ) -> HashMap<String, SeriesFetch> {
        let mut results = HashMap::with_capacity(markets.len());
        for (i, market) in markets.iter().enumerate() {
            info!("Downloading {}, market {}/{}", market, i + 1, markets.len());
            let fetch = self.fetcher.fetch(market, window).await;
            results.insert(market.clone(), fetch);
        }
        results
    }
}
