use crate::normalize::{dedupe_latest, normalize_record};
use candlekeep_core::market::entity::{Candle, FetchWindow};
use candlekeep_core::market::port::CandleSource;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// # Summary
/// 单市场抓取结果的分类，区分"无数据"与"抓取失败"。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesStatus {
    // 正常覆盖整个窗口
    Complete,
    // 交易所在窗口内没有该市场的数据
    NoData,
    // 被限流中断，保留已抓取的页
    RateLimited { pages: usize },
    // 传输或解析失败，结果为空
    Failed(String),
}

/// # Summary
/// 单市场抓取结果。
///
/// # Invariants
/// - `candles` 按 `date` 升序且无重复。
/// - `status` 为 `Failed` 时 `candles` 必为空。
#[derive(Debug, Clone)]
pub struct SeriesFetch {
    pub market: String,
    pub candles: Vec<Candle>,
    pub status: SeriesStatus,
}

impl SeriesFetch {
    fn failed(market: &str, reason: String) -> Self {
        Self {
            market: market.to_string(),
            candles: Vec::new(),
            status: SeriesStatus::Failed(reason),
        }
    }
}

/// # Summary
/// 单市场时间序列抓取器，从窗口终点向前逐页回溯直到覆盖起点。
///
/// # Invariants
/// - 单个市场的失败只影响该市场，绝不向上抛出。
/// - 不做内联重试；被限流时立即停止翻页。
pub struct SeriesFetcher {
    // 原始数据源
    source: Arc<dyn CandleSource>,
    // 单页行数上限
    page_limit: u32,
}

impl SeriesFetcher {
    pub fn new(source: Arc<dyn CandleSource>, page_limit: u32) -> Self {
        Self { source, page_limit }
    }

    pub fn page_limit(&self) -> u32 {
        self.page_limit
    }

    /// # Summary
    /// 抓取单个市场在窗口内的完整 K 线序列。
    ///
    /// # Logic
    /// 1. 游标 `end_cursor` 初始化为窗口终点。
    /// 2. 反复请求 `[start - 1 周期, end_cursor]`，多请求的一个周期保证边界页非空。
    /// 3. 游标移动到本页最早一根的时间；游标不晚于起点、空页或游标未前移时结束。
    /// 4. 限流时停止翻页并保留已累积数据；其它错误记录日志后返回空结果。
    /// 5. 规范化、按 `date` 去重（后抓取者优先）并升序排列。
    ///
    /// # Arguments
    /// * `market`: 市场代码。
    /// * `window`: 抓取窗口。
    ///
    /// # Returns
    /// 带状态的抓取结果，永不失败。
    pub async fn fetch(&self, market: &str, window: FetchWindow) -> SeriesFetch {
        let padded_start = window.start - window.resolution.duration();
        let mut end_cursor = window.end;
        let mut records = Vec::new();
        let mut pages = 0usize;
        let mut rate_limited = false;

        while end_cursor > window.start {
            let page = match self
                .source
                .fetch_candle_page(
                    market,
                    window.resolution,
                    padded_start,
                    end_cursor,
                    self.page_limit,
                )
                .await
            {
                Ok(page) => page,
                Err(e) if e.is_rate_limited() => {
                    warn!(
                        "Rate limited while paging {} after {} pages, keeping partial data",
                        market, pages
                    );
                    rate_limited = true;
                    break;
                }
                Err(e) => {
                    error!("Unable to get candle data for market {}: {}", market, e);
                    return SeriesFetch::failed(market, e.to_string());
                }
            };

            let Some(earliest) = page.iter().map(|r| r.started_at).min() else {
                break;
            };
            pages += 1;
            records.extend(page);

            if earliest >= end_cursor {
                debug!(
                    "Page for {} made no backward progress at {}, stopping",
                    market, end_cursor
                );
                break;
            }
            end_cursor = earliest;
        }

        let candles = match records
            .into_iter()
            .map(normalize_record)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(candles) => dedupe_latest(candles),
            Err(e) => {
                error!("Unable to normalize candle data for market {}: {}", market, e);
                return SeriesFetch::failed(market, e.to_string());
            }
        };

        let status = if rate_limited {
            SeriesStatus::RateLimited { pages }
        } else if candles.is_empty() {
            SeriesStatus::NoData
        } else {
            SeriesStatus::Complete
        };

        debug!(
            "Fetched {} candles for {} in {} pages ({:?})",
            candles.len(),
            market,
            pages,
            status
        );

        SeriesFetch {
            market: market.to_string(),
            candles,
            status,
        }
    }
}
