use crate::error::IngestError;
use candlekeep_core::common::Resolution;
use candlekeep_core::common::time::{TimeProvider, align_down};
use candlekeep_core::config::IngestConfig;
use candlekeep_core::market::entity::FetchWindow;
use candlekeep_core::market::port::CandleSource;
use candlekeep_core::store::port::CandleStore;
use candlekeep_market::discovery::MarketDiscovery;
use candlekeep_market::orchestrator::Orchestrator;
use candlekeep_market::series::{SeriesFetcher, SeriesStatus};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// # Summary
/// 每轮采集的市场来源。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketSelection {
    // 固定列表
    Fixed(Vec<String>),
    // 每轮重新发现在线市场，可选按成交额只保留前 N 个
    Online {
        top: Option<usize>,
        lookback_days: u32,
    },
}

impl MarketSelection {
    /// 配置中的市场列表为空时，每轮重新发现在线市场。
    pub fn from_config(config: &IngestConfig) -> Self {
        if config.markets.is_empty() {
            MarketSelection::Online {
                top: config.top_markets,
                lookback_days: config.volume_lookback_days,
            }
        } else {
            MarketSelection::Fixed(config.markets.clone())
        }
    }
}

/// # Summary
/// 一次窗口采集的结果摘要。
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub window: FetchWindow,
    pub candles_fetched: usize,
    pub rows_written: u64,
    pub statuses: BTreeMap<String, SeriesStatus>,
    pub download: Duration,
    pub save: Duration,
}

/// # Summary
/// 启动时历史导入流程的结果。
#[derive(Debug, Clone)]
pub enum SetupOutcome {
    // 未开启历史导入，只保证表结构存在
    SchemaOnly,
    // 表中已有数据且不允许清空，跳过导入
    KeptExisting { markets: usize },
    // 完成历史导入
    Imported(CycleReport),
}

/// # Summary
/// 采集应用服务，组合编排器、市场发现与存储端口。
/// 编译期仅依赖 `candlekeep-core` 中的 Trait 定义，所有具体实现通过构造函数注入。
///
/// # Invariants
/// - 存储失败总是向调用方传播，不做部分提交。
/// - 单个市场的抓取失败只记录日志，不影响其它市场。
pub struct IngestService {
    orchestrator: Orchestrator,
    discovery: MarketDiscovery,
    store: Arc<dyn CandleStore>,
    clock: Arc<dyn TimeProvider>,
    config: IngestConfig,
}

impl IngestService {
    /// # Summary
    /// 创建 IngestService 实例。
    ///
    /// # Arguments
    /// * `source` - 交易所数据源。
    /// * `store` - K 线存储。
    /// * `clock` - 时钟，用于市场发现与历史导入的终点。
    /// * `config` - 采集配置。
    /// * `page_limit` - 单页行数上限。
    pub fn new(
        source: Arc<dyn CandleSource>,
        store: Arc<dyn CandleStore>,
        clock: Arc<dyn TimeProvider>,
        config: IngestConfig,
        page_limit: u32,
    ) -> Self {
        let fetcher = Arc::new(SeriesFetcher::new(source.clone(), page_limit));
        Self {
            orchestrator: Orchestrator::new(fetcher.clone()),
            discovery: MarketDiscovery::new(source, fetcher, clock.clone()),
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// # Summary
    /// 解析本轮要采集的市场列表。
    ///
    /// # Returns
    /// * 非空的市场列表；结果为空时返回 `IngestError::NoMarkets`。
    pub async fn resolve_markets(
        &self,
        selection: &MarketSelection,
    ) -> Result<Vec<String>, IngestError> {
        let markets = match selection {
            MarketSelection::Fixed(markets) => markets.clone(),
            MarketSelection::Online {
                top: Some(n),
                lookback_days,
            } => {
                self.discovery
                    .top_markets_by_volume(*n, *lookback_days)
                    .await?
            }
            MarketSelection::Online { top: None, .. } => {
                self.discovery.list_online_markets().await?
            }
        };
        if markets.is_empty() {
            return Err(IngestError::NoMarkets);
        }
        Ok(markets)
    }

    /// # Summary
    /// 抓取一组市场在窗口内的 K 线并写入存储。
    ///
    /// # Logic
    /// 1. 通过编排器抓取并合并所有市场的数据，记录下载耗时。
    /// 2. 逐个记录非正常结束的市场。
    /// 3. 有数据时整批 upsert，记录保存耗时；存储失败直接返回。
    ///
    /// # Arguments
    /// * `markets` - 市场代码列表。
    /// * `window` - 抓取窗口。
    ///
    /// # Returns
    /// * `Result<CycleReport, IngestError>`
    pub async fn ingest_window(
        &self,
        markets: &[String],
        window: FetchWindow,
    ) -> Result<CycleReport, IngestError> {
        let started = Instant::now();
        let batch = self.orchestrator.fetch_all(markets, window).await;
        let download = started.elapsed();
        debug!(
            "Downloaded {} candles for {} markets in {:?}",
            batch.candles.len(),
            markets.len(),
            download
        );

        for (market, status) in &batch.statuses {
            match status {
                SeriesStatus::Complete => {}
                SeriesStatus::NoData => info!("No candle data for {} in window", market),
                other => warn!("Market {} finished with {:?}", market, other),
            }
        }

        let started = Instant::now();
        let rows_written = if batch.candles.is_empty() {
            info!("Nothing to save for window ending {}", window.end);
            0
        } else {
            self.store
                .upsert_candles(&self.config.table_name, &batch.candles)
                .await?
        };
        let save = started.elapsed();
        debug!("Saved {} rows to {} in {:?}", rows_written, self.config.table_name, save);

        Ok(CycleReport {
            window,
            candles_fetched: batch.candles.len(),
            rows_written,
            statuses: batch.statuses,
            download,
            save,
        })
    }

    /// # Summary
    /// 一次性导入 `[start, end]` 的历史数据。
    pub async fn backfill(
        &self,
        markets: &[String],
        resolution: Resolution,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CycleReport, IngestError> {
        info!(
            "Backfilling {} markets from {} to {} at {}",
            markets.len(),
            start,
            end,
            resolution
        );
        let report = self
            .ingest_window(markets, FetchWindow::new(start, end, resolution))
            .await?;
        info!(
            "Backfill done: {} candles fetched, {} rows written",
            report.candles_fetched, report.rows_written
        );
        Ok(report)
    }

    /// # Summary
    /// 启动时的建表与历史导入流程。
    ///
    /// # Logic
    /// 1. 确保目标表与 `(date, market)` 唯一索引存在。
    /// 2. 未开启历史导入时直接返回。
    /// 3. 表中已有数据：不允许清空则保留并跳过导入，否则先清空。
    /// 4. 从 `historical_start` 导入到当前周期边界。
    ///
    /// # Arguments
    /// * `selection` - 导入的市场来源。
    ///
    /// # Returns
    /// * `Result<SetupOutcome, IngestError>`
    pub async fn setup(&self, selection: &MarketSelection) -> Result<SetupOutcome, IngestError> {
        let table = &self.config.table_name;
        self.store.ensure_schema(table).await?;
        if !self.config.import_historical_on_start {
            return Ok(SetupOutcome::SchemaOnly);
        }

        let extents = self.store.market_extents(table).await?;
        if !extents.is_empty() {
            if !self.config.delete_existing_on_import {
                info!(
                    "Table {} already holds {} markets, keeping existing data and skipping import",
                    table,
                    extents.len()
                );
                return Ok(SetupOutcome::KeptExisting {
                    markets: extents.len(),
                });
            }
            warn!("Deleting existing data in {} before import", table);
            self.store.truncate(table).await?;
        }

        let resolution = self.config.resolution;
        let markets = self.resolve_markets(selection).await?;
        let end = align_down(self.clock.now(), resolution.seconds());
        let report = self
            .backfill(&markets, resolution, self.config.historical_start, end)
            .await?;
        Ok(SetupOutcome::Imported(report))
    }
}
