//! 供各 crate 测试使用的端口替身。

use crate::common::Resolution;
use crate::market::entity::{Candle, CandleRecord, MarketInfo, MarketStatus};
use crate::market::error::MarketError;
use crate::market::port::CandleSource;
use crate::store::entity::MarketExtent;
use crate::store::error::StoreError;
use crate::store::port::CandleStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// 构造一条原始 K 线记录，数值由 `close` 推导。
pub fn record(market: &str, started_at: DateTime<Utc>, close: f64) -> CandleRecord {
    CandleRecord {
        started_at,
        updated_at: started_at + Duration::minutes(59),
        market: market.to_string(),
        resolution: Resolution::Hour1.as_code().to_string(),
        low: format!("{}", close - 1.0),
        high: format!("{}", close + 1.0),
        open: format!("{}", close - 0.5),
        close: format!("{}", close),
        base_token_volume: "10".to_string(),
        trades: "5".to_string(),
        usd_volume: format!("{}", close * 10.0),
        starting_open_interest: "100".to_string(),
    }
}

/// 构造一根规范化 K 线。
pub fn candle(market: &str, date: DateTime<Utc>, close: f64) -> Candle {
    Candle {
        date,
        updated: date + Duration::minutes(59),
        market: market.to_string(),
        resolution: Resolution::Hour1,
        open_price: close - 0.5,
        close_price: close,
        high_price: close + 1.0,
        low_price: close - 1.0,
        volume: 10.0,
        volume_usd: close * 10.0,
        trades: 5,
        starting_interest: 100.0,
    }
}

/// 单次页请求的记录。
#[derive(Debug, Clone, PartialEq)]
pub struct PageCall {
    pub market: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// # Summary
/// 模拟交易所数据源。
///
/// # Logic
/// 1. 若市场存在预设脚本响应，按顺序弹出返回。
/// 2. 否则从该市场的完整历史中截取 `[from, to]`，倒序并按 `limit` 截断。
/// 3. 若设置了闸门，请求在获得许可前挂起。
#[derive(Default)]
pub struct MockSource {
    markets: Mutex<Vec<MarketInfo>>,
    history: Mutex<HashMap<String, Vec<CandleRecord>>>,
    scripted: Mutex<HashMap<String, VecDeque<Result<Vec<CandleRecord>, MarketError>>>>,
    calls: Mutex<Vec<PageCall>>,
    delay: Mutex<Option<std::time::Duration>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_market(&self, symbol: &str, online: bool) {
        let status = if online {
            MarketStatus::Online
        } else {
            MarketStatus::Other("OFFLINE".to_string())
        };
        lock(&self.markets).push(MarketInfo {
            symbol: symbol.to_string(),
            status,
        });
    }

    /// 为市场生成 `[from, to]` 内的整点小时线，收盘价由 `close_of` 给出。
    pub fn with_hourly_history(
        &self,
        market: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        close_of: impl Fn(DateTime<Utc>) -> f64,
    ) {
        let mut rows = Vec::new();
        let mut t = from;
        while t <= to {
            rows.push(record(market, t, close_of(t)));
            t += Duration::hours(1);
        }
        lock(&self.history).insert(market.to_string(), rows);
    }

    pub fn with_history(&self, market: &str, rows: Vec<CandleRecord>) {
        lock(&self.history).insert(market.to_string(), rows);
    }

    pub fn push_response(&self, market: &str, response: Result<Vec<CandleRecord>, MarketError>) {
        lock(&self.scripted)
            .entry(market.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn with_delay(&self, delay: std::time::Duration) {
        *lock(&self.delay) = Some(delay);
    }

    /// 安装闸门：之后的每次页请求都要消耗一个许可，测试通过 `add_permits` 放行。
    pub fn with_gate(&self, gate: Arc<Semaphore>) {
        *lock(&self.gate) = Some(gate);
    }

    pub fn calls(&self) -> Vec<PageCall> {
        lock(&self.calls).clone()
    }

    pub fn calls_for(&self, market: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.market == market).count()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl CandleSource for MockSource {
    async fn list_markets(&self) -> Result<Vec<MarketInfo>, MarketError> {
        Ok(lock(&self.markets).clone())
    }

    async fn fetch_candle_page(
        &self,
        market: &str,
        _resolution: Resolution,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<CandleRecord>, MarketError> {
        lock(&self.calls).push(PageCall {
            market: market.to_string(),
            from,
            to,
        });
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let gate = lock(&self.gate).clone();
        if let Some(gate) = gate
            && let Ok(permit) = gate.acquire().await
        {
            permit.forget();
        }
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = lock(&self.scripted)
            .get_mut(market)
            .and_then(|q| q.pop_front());
        let result = match scripted {
            Some(response) => response,
            None => {
                let mut rows: Vec<CandleRecord> = lock(&self.history)
                    .get(market)
                    .map(|rows| {
                        rows.iter()
                            .filter(|r| r.started_at >= from && r.started_at <= to)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
                rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
                Ok(rows)
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// # Summary
/// 基于内存的 K 线存储实现，语义与 upsert 键 `(date, market)` 一致。
#[derive(Default)]
pub struct MemCandleStore {
    tables: Mutex<BTreeMap<String, BTreeMap<(DateTime<Utc>, String), Candle>>>,
    fail_upserts: AtomicUsize,
    upserts: Mutex<Vec<usize>>,
}

impl MemCandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让接下来的 `n` 次 upsert 失败。
    pub fn fail_next_upserts(&self, n: usize) {
        self.fail_upserts.store(n, Ordering::SeqCst);
    }

    /// 每次成功 upsert 的批次大小。
    pub fn upsert_batches(&self) -> Vec<usize> {
        lock(&self.upserts).clone()
    }

    pub fn rows(&self, table: &str) -> Vec<Candle> {
        lock(&self.tables)
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_table(&self, table: &str) -> bool {
        lock(&self.tables).contains_key(table)
    }
}

#[async_trait]
impl CandleStore for MemCandleStore {
    async fn upsert_candles(&self, table: &str, candles: &[Candle]) -> Result<u64, StoreError> {
        let pending = self.fail_upserts.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_upserts.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Merge("injected failure".to_string()));
        }

        let mut tables = lock(&self.tables);
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::Schema(format!("table {} does not exist", table)))?;
        for candle in candles {
            rows.insert((candle.date, candle.market.clone()), candle.clone());
        }
        lock(&self.upserts).push(candles.len());
        Ok(u64::try_from(candles.len()).unwrap_or(u64::MAX))
    }

    async fn ensure_schema(&self, table: &str) -> Result<(), StoreError> {
        lock(&self.tables).entry(table.to_string()).or_default();
        Ok(())
    }

    async fn market_extents(&self, table: &str) -> Result<Vec<MarketExtent>, StoreError> {
        let tables = lock(&self.tables);
        let mut extents: BTreeMap<String, MarketExtent> = BTreeMap::new();
        for (date, market) in tables.get(table).into_iter().flat_map(|t| t.keys()) {
            extents
                .entry(market.clone())
                .and_modify(|e| {
                    e.first_candle = e.first_candle.min(*date);
                    e.last_candle = e.last_candle.max(*date);
                })
                .or_insert(MarketExtent {
                    market: market.clone(),
                    first_candle: *date,
                    last_candle: *date,
                });
        }
        Ok(extents.into_values().collect())
    }

    async fn truncate(&self, table: &str) -> Result<(), StoreError> {
        if let Some(rows) = lock(&self.tables).get_mut(table) {
            rows.clear();
        }
        Ok(())
    }

    async fn load_candles(
        &self,
        table: &str,
        markets: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, StoreError> {
        Ok(self
            .rows(table)
            .into_iter()
            .filter(|c| c.date >= start && c.date <= end && markets.contains(&c.market))
            .collect())
    }
}
