//! 批量装载所需的 CSV 编码与标识符处理。

use candlekeep_core::market::entity::Candle;
use candlekeep_core::store::error::StoreError;
use chrono::{DateTime, SecondsFormat, Utc};
use csv::{QuoteStyle, Terminator, WriterBuilder};

/// PostgreSQL 标识符的最大字节数。
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// 单次发送给 COPY 的数据块大小。
pub const COPY_CHUNK_SIZE: usize = 8 * 1024;

/// # Summary
/// 校验表名是否为安全的裸标识符 `[A-Za-z_][A-Za-z0-9_]*`。
///
/// # Returns
/// 合法时原样返回，否则返回 `StoreError::InvalidIdentifier`。
pub fn validate_identifier(name: &str) -> Result<&str, StoreError> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if head_ok && tail_ok && name.len() <= MAX_IDENTIFIER_LEN {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// 为已校验的标识符加双引号。
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// 暂存表名。超出长度时由数据库截断，在同一会话内保持一致。
pub fn staging_name(table: &str) -> String {
    format!("staging_{}", table)
}

/// # Summary
/// 按目标表的列顺序将 K 线编码为 CSV。
///
/// # Logic
/// 1. 每一列必须对应 `Candle` 的一个字段，否则返回 `Schema` 错误。
/// 2. 使用 `QuoteStyle::NonNumeric`，文本与时间戳加引号，数值原样输出。
/// 3. 非有限浮点数写为 `NaN` / `Infinity` / `-Infinity`。
///
/// # Arguments
/// * `columns`: 目标表列名（不含代理主键）。
/// * `candles`: 待编码数据。
///
/// # Returns
/// 完整的 CSV 字节，每根 K 线一行。
pub fn encode_csv(columns: &[String], candles: &[Candle]) -> Result<Vec<u8>, StoreError> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::NonNumeric)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(candles.len() * 160));

    for candle in candles {
        let record = columns
            .iter()
            .map(|column| field(column, candle))
            .collect::<Result<Vec<String>, StoreError>>()?;
        writer
            .write_record(&record)
            .map_err(|e| StoreError::Transfer(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| StoreError::Transfer(e.to_string()))
}

fn field(column: &str, candle: &Candle) -> Result<String, StoreError> {
    let value = match column {
        "date" => timestamp(candle.date),
        "updated" => timestamp(candle.updated),
        "market" => candle.market.clone(),
        "resolution" => candle.resolution.as_code().to_string(),
        "open_price" => float(candle.open_price),
        "close_price" => float(candle.close_price),
        "high_price" => float(candle.high_price),
        "low_price" => float(candle.low_price),
        "volume" => float(candle.volume),
        "volume_usd" => float(candle.volume_usd),
        "trades" => candle.trades.to_string(),
        "starting_interest" => float(candle.starting_interest),
        other => {
            return Err(StoreError::Schema(format!(
                "column {} has no candle field",
                other
            )));
        }
    };
    Ok(value)
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

// PostgreSQL 的非有限浮点拼写
fn float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "Infinity".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        value.to_string()
    }
}

/// 将字节切分为 COPY 数据块。
pub fn chunks(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    data.chunks(COPY_CHUNK_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candlekeep_core::market::entity::CANDLE_COLUMNS;
    use candlekeep_core::testing::candle;
    use chrono::TimeZone;

    fn columns() -> Vec<String> {
        CANDLE_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("dydx_candles").is_ok());
        assert!(validate_identifier("_t1").is_ok());
        assert!(validate_identifier("1table").is_err());
        assert!(validate_identifier("candles; DROP TABLE x").is_err());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("a\"b").is_err());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
        assert!(validate_identifier(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_encode_csv_in_column_order() {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap();
        let c = candle("BTC-USD", date, 42000.5);
        let csv = encode_csv(&columns(), &[c]).unwrap();
        assert_eq!(
            String::from_utf8(csv).unwrap(),
            "\"2024-01-01T13:00:00Z\",\"2024-01-01T13:59:00Z\",\"BTC-USD\",\"1HOUR\",\
             42000,42000.5,42001.5,41999.5,10,420005,5,100\n"
        );
    }

    #[test]
    fn test_encode_csv_follows_table_order() {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap();
        let c = candle("ETH-USD", date, 2.0);
        let cols = vec!["market".to_string(), "trades".to_string(), "date".to_string()];
        let csv = encode_csv(&cols, &[c]).unwrap();
        assert_eq!(
            String::from_utf8(csv).unwrap(),
            "\"ETH-USD\",5,\"2024-01-01T13:00:00Z\"\n"
        );
    }

    #[test]
    fn test_encode_csv_non_finite_and_quotes() {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap();
        let mut c = candle("WEIRD\"MKT", date, 1.0);
        c.open_price = f64::NAN;
        c.high_price = f64::INFINITY;
        c.low_price = f64::NEG_INFINITY;
        let cols = vec![
            "market".to_string(),
            "open_price".to_string(),
            "high_price".to_string(),
            "low_price".to_string(),
        ];
        let csv = encode_csv(&cols, &[c]).unwrap();
        assert_eq!(
            String::from_utf8(csv).unwrap(),
            "\"WEIRD\"\"MKT\",NaN,Infinity,-Infinity\n"
        );
    }

    #[test]
    fn test_encode_csv_unknown_column() {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap();
        let cols = vec!["date".to_string(), "funding_rate".to_string()];
        let err = encode_csv(&cols, &[candle("BTC-USD", date, 1.0)]).unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));
    }

    #[test]
    fn test_encode_csv_one_line_per_candle() {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap();
        let rows = vec![candle("BTC-USD", date, 1.0), candle("ETH-USD", date, 2.0)];
        let cols = vec!["market".to_string(), "close_price".to_string()];
        let csv = encode_csv(&cols, &rows).unwrap();
        assert_eq!(
            String::from_utf8(csv).unwrap(),
            "\"BTC-USD\",1\n\"ETH-USD\",2\n"
        );
        assert!(encode_csv(&cols, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_chunks_cover_payload() {
        let data = vec![b'x'; COPY_CHUNK_SIZE * 2 + 5];
        let sizes: Vec<usize> = chunks(&data).map(|c| c.len()).collect();
        assert_eq!(sizes, vec![COPY_CHUNK_SIZE, COPY_CHUNK_SIZE, 5]);
    }
}
