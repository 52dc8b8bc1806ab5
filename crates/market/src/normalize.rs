use candlekeep_core::common::Resolution;
use candlekeep_core::market::entity::{Candle, CandleRecord};
use candlekeep_core::market::error::MarketError;
use std::collections::BTreeMap;

fn parse_f64(field: &str, raw: &str) -> Result<f64, MarketError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|e| MarketError::Parse(format!("{}={:?}: {}", field, raw, e)))
}

/// # Summary
/// 将交易所原始记录转换为规范化 K 线。
///
/// # Logic
/// 1. 价格、成交量、未平仓量解析为浮点数。
/// 2. 成交笔数解析为整数。
/// 3. 字段按规范列名映射 (`startedAt → date`, `usdVolume → volume_usd` 等)。
///
/// # Returns
/// 任一字段非法时返回 `MarketError::Parse`。
pub fn normalize_record(record: CandleRecord) -> Result<Candle, MarketError> {
    let resolution = record
        .resolution
        .parse::<Resolution>()
        .map_err(MarketError::Parse)?;
    let trades = record
        .trades
        .trim()
        .parse::<i64>()
        .map_err(|e| MarketError::Parse(format!("trades={:?}: {}", record.trades, e)))?;

    Ok(Candle {
        date: record.started_at,
        updated: record.updated_at,
        resolution,
        open_price: parse_f64("open", &record.open)?,
        close_price: parse_f64("close", &record.close)?,
        high_price: parse_f64("high", &record.high)?,
        low_price: parse_f64("low", &record.low)?,
        volume: parse_f64("baseTokenVolume", &record.base_token_volume)?,
        volume_usd: parse_f64("usdVolume", &record.usd_volume)?,
        trades,
        starting_interest: parse_f64("startingOpenInterest", &record.starting_open_interest)?,
        market: record.market,
    })
}

/// # Summary
/// 按 `date` 去重，保留最后抓取到的值，并按时间升序返回。
///
/// # Arguments
/// * `candles`: 按抓取顺序排列的 K 线（后出现者代表更新的服务端状态）。
pub fn dedupe_latest(candles: impl IntoIterator<Item = Candle>) -> Vec<Candle> {
    let mut by_date = BTreeMap::new();
    for candle in candles {
        by_date.insert(candle.date, candle);
    }
    by_date.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(hour: u32, close: &str) -> CandleRecord {
        CandleRecord {
            started_at: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, hour, 59, 0).unwrap(),
            market: "BTC-USD".to_string(),
            resolution: "1HOUR".to_string(),
            low: "41000.5".to_string(),
            high: "42100".to_string(),
            open: "41200".to_string(),
            close: close.to_string(),
            base_token_volume: "12.5".to_string(),
            trades: "321".to_string(),
            usd_volume: "515000.75".to_string(),
            starting_open_interest: "800.25".to_string(),
        }
    }

    #[test]
    fn test_normalize_maps_every_field() {
        let candle = normalize_record(record(3, "41900")).unwrap();
        assert_eq!(candle.date, Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap());
        assert_eq!(candle.updated, Utc.with_ymd_and_hms(2024, 1, 1, 3, 59, 0).unwrap());
        assert_eq!(candle.market, "BTC-USD");
        assert_eq!(candle.resolution, Resolution::Hour1);
        assert_eq!(candle.open_price, 41200.0);
        assert_eq!(candle.close_price, 41900.0);
        assert_eq!(candle.high_price, 42100.0);
        assert_eq!(candle.low_price, 41000.5);
        assert_eq!(candle.volume, 12.5);
        assert_eq!(candle.volume_usd, 515000.75);
        assert_eq!(candle.trades, 321);
        assert_eq!(candle.starting_interest, 800.25);
    }

    #[test]
    fn test_normalize_rejects_bad_number() {
        let err = normalize_record(record(3, "n/a")).unwrap_err();
        assert!(matches!(err, MarketError::Parse(msg) if msg.contains("close")));
    }

    #[test]
    fn test_dedupe_keeps_last_fetched() {
        let first = normalize_record(record(5, "100")).unwrap();
        let older = normalize_record(record(4, "90")).unwrap();
        let revised = normalize_record(record(5, "101")).unwrap();

        let out = dedupe_latest(vec![first, older, revised]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].close_price, 90.0);
        assert_eq!(out[1].close_price, 101.0);
    }
}
