use async_trait::async_trait;
use candlekeep_core::common::Resolution;
use candlekeep_core::config::ExchangeConfig;
use candlekeep_core::market::entity::{CandleRecord, MarketInfo, MarketStatus};
use candlekeep_core::market::error::MarketError;
use candlekeep_core::market::port::{CandleSource, MAX_PAGE_LIMIT};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// # Summary
/// dYdX 公共 REST 接口的行情提供者实现。
///
/// # Invariants
/// - 使用 `reqwest` 异步客户端进行通讯，只访问公开只读接口。
/// - 每次调用只发起一次请求，不做重试。
#[derive(Clone)]
pub struct DydxProvider {
    /// 内部使用的 HTTP 客户端
    client: Client,
    /// 接口根地址，不含末尾斜杠
    base_url: String,
}

impl DydxProvider {
    /// # Summary
    /// 创建一个新的 DydxProvider 实例。
    ///
    /// # Logic
    /// 1. 按配置设置请求超时。
    /// 2. 初始化 reqwest 客户端。
    ///
    /// # Arguments
    /// * `config`: 交易所配置。
    ///
    /// # Returns
    /// 成功返回 DydxProvider，客户端构建失败返回 `MarketError::Transport`。
    pub fn new(config: &ExchangeConfig) -> Result<Self, MarketError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MarketError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// # Summary
    /// 发起 GET 请求并把响应体解析为 `T`。
    ///
    /// # Logic
    /// 1. 发送请求，连接层失败映射为 `Transport`。
    /// 2. 读取响应体后交给 `decode_response` 处理状态与解析。
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, MarketError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| MarketError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| MarketError::Transport(e.to_string()))?;

        decode_response(status, &body)
    }
}

/// # Summary
/// 将 HTTP 状态与响应体映射为解析结果或 `MarketError`。
///
/// # Logic
/// 1. 非 2xx 状态映射为 `Exchange`，429 标记为限流。
/// 2. 2xx 时按 JSON 解析，失败映射为 `Parse`。
fn decode_response<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, MarketError> {
    if !status.is_success() {
        return Err(MarketError::from_status(
            status.as_u16(),
            truncate(body, 256),
        ));
    }

    serde_json::from_str(body)
        .map_err(|e| MarketError::Parse(format!("{} (body: {})", e, truncate(body, 256))))
}

/// `/v3/markets` 响应。
#[derive(Deserialize, Debug)]
struct MarketsResponse {
    markets: BTreeMap<String, DydxMarket>,
}

#[derive(Deserialize, Debug)]
struct DydxMarket {
    status: String,
}

/// `/v3/candles/{market}` 响应。
#[derive(Deserialize, Debug)]
struct CandlesResponse {
    candles: Vec<CandleRecord>,
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn iso(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn truncate(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

fn markets_from_response(resp: MarketsResponse) -> Vec<MarketInfo> {
    resp.markets
        .into_iter()
        .map(|(symbol, m)| MarketInfo {
            symbol,
            status: MarketStatus::parse(&m.status),
        })
        .collect()
}

#[async_trait]
impl CandleSource for DydxProvider {
    /// # Summary
    /// 查询 dYdX 全部挂牌市场。
    ///
    /// # Returns
    /// 按代码排序的市场列表（含非在线市场）。
    async fn list_markets(&self) -> Result<Vec<MarketInfo>, MarketError> {
        let resp: MarketsResponse = self.get_json(&self.endpoint("v3/markets"), &[]).await?;
        let markets = markets_from_response(resp);
        debug!("dYdX listed {} markets", markets.len());
        Ok(markets)
    }

    /// # Summary
    /// 抓取一页 K 线。
    ///
    /// # Logic
    /// 1. 将页大小截断到 `MAX_PAGE_LIMIT`。
    /// 2. 以 ISO-8601（毫秒精度）格式传递起止时间。
    /// 3. 返回交易所原样的倒序记录。
    async fn fetch_candle_page(
        &self,
        market: &str,
        resolution: Resolution,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<CandleRecord>, MarketError> {
        let url = self.endpoint(&format!("v3/candles/{}", market));
        let from_iso = iso(from);
        let to_iso = iso(to);
        let limit = limit.clamp(1, MAX_PAGE_LIMIT).to_string();

        let resp: CandlesResponse = self
            .get_json(
                &url,
                &[
                    ("resolution", resolution.as_code()),
                    ("fromISO", from_iso.as_str()),
                    ("toISO", to_iso.as_str()),
                    ("limit", limit.as_str()),
                ],
            )
            .await?;

        debug!(
            "dYdX page {} {} [{} .. {}]: {} rows",
            market,
            resolution,
            from_iso,
            to_iso,
            resp.candles.len()
        );
        Ok(resp.candles)
    }
}
