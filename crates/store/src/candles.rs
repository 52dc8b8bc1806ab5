use crate::copy::{chunks, encode_csv, quote_ident, staging_name, validate_identifier};
use async_trait::async_trait;
use candlekeep_core::common::Resolution;
use candlekeep_core::market::entity::Candle;
use candlekeep_core::store::entity::MarketExtent;
use candlekeep_core::store::error::StoreError;
use candlekeep_core::store::port::CandleStore;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// 代理主键列，装载时跳过。
const SURROGATE_KEY: &str = "id";

type CandleRow = (
    DateTime<Utc>,
    DateTime<Utc>,
    String,
    String,
    f64,
    f64,
    f64,
    f64,
    f64,
    f64,
    i64,
    f64,
);

/// CandleStore 的 PostgreSQL 实现。
///
/// # Summary
/// 通过 "临时暂存表 + COPY + INSERT ... ON CONFLICT" 完成批量 upsert。
///
/// # Invariants
/// * 每次 upsert 在单个事务内完成，失败时回滚，暂存表随事务一起消失。
/// * 表名在拼入 SQL 之前必须通过 `validate_identifier`。
pub struct PgCandleStore {
    pool: PgPool,
}

impl PgCandleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// # Summary
    /// 读取目标表的列名，按定义顺序排列并去掉代理主键。
    ///
    /// # Returns
    /// * 列名列表；表不存在时返回 `StoreError::Schema`。
    async fn table_columns(conn: &mut PgConnection, table: &str) -> Result<Vec<String>, StoreError> {
        let columns = sqlx::query_scalar::<_, String>(
            r#"
            SELECT column_name::text
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if columns.is_empty() {
            return Err(StoreError::Schema(format!("table {} does not exist", table)));
        }
        Ok(columns
            .into_iter()
            .filter(|c| c != SURROGATE_KEY)
            .collect())
    }
}

/// 按 `(date, market)` 去重，后出现者优先。
fn dedupe_by_key(candles: &[Candle]) -> Vec<Candle> {
    let mut latest: BTreeMap<(DateTime<Utc>, &str), &Candle> = BTreeMap::new();
    for candle in candles {
        latest.insert((candle.date, candle.market.as_str()), candle);
    }
    latest.into_values().cloned().collect()
}

fn row_to_candle(row: CandleRow) -> Result<Candle, StoreError> {
    let resolution = row
        .3
        .parse::<Resolution>()
        .map_err(StoreError::Schema)?;
    Ok(Candle {
        date: row.0,
        updated: row.1,
        market: row.2,
        resolution,
        open_price: row.4,
        close_price: row.5,
        high_price: row.6,
        low_price: row.7,
        volume: row.8,
        volume_usd: row.9,
        trades: row.10,
        starting_interest: row.11,
    })
}

#[async_trait]
impl CandleStore for PgCandleStore {
    /// # Summary
    /// 批量写入 K 线。
    ///
    /// # Logic
    /// 1. 校验表名；空批次直接返回。
    /// 2. 开启事务，读取目标表列顺序。
    /// 3. 创建 `ON COMMIT DROP` 的临时暂存表，结构与目标表一致。
    /// 4. 将去重后的数据编码为 CSV，分块 COPY 进暂存表。
    /// 5. `INSERT ... SELECT ... ON CONFLICT (date, market) DO UPDATE` 合并后提交。
    ///
    /// # Arguments
    /// * `table` - 目标表名。
    /// * `candles` - 待写入数据。
    ///
    /// # Returns
    /// * 合并语句影响的行数。
    async fn upsert_candles(&self, table: &str, candles: &[Candle]) -> Result<u64, StoreError> {
        let table = validate_identifier(table)?;
        if candles.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let columns = Self::table_columns(&mut *tx, table).await?;
        let rows = dedupe_by_key(candles);
        let payload = encode_csv(&columns, &rows)?;

        let target = quote_ident(table);
        let staging = quote_ident(&staging_name(table));
        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        sqlx::query(&format!(
            "CREATE TEMPORARY TABLE {} (LIKE {} INCLUDING DEFAULTS INCLUDING CONSTRAINTS INCLUDING INDEXES) ON COMMIT DROP",
            staging, target
        ))
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Staging(e.to_string()))?;

        let mut copy = tx
            .copy_in_raw(&format!(
                "COPY {} ({}) FROM STDIN WITH (FORMAT CSV)",
                staging, column_list
            ))
            .await
            .map_err(|e| StoreError::Transfer(e.to_string()))?;
        let mut sent = Ok(());
        for chunk in chunks(&payload) {
            sent = copy.send(chunk).await.map(|_| ());
            if sent.is_err() {
                break;
            }
        }
        if let Err(e) = sent {
            if let Err(abort) = copy.abort(e.to_string()).await {
                warn!("Failed to abort COPY into {}: {}", staging, abort);
            }
            return Err(StoreError::Transfer(e.to_string()));
        }
        let copied = copy
            .finish()
            .await
            .map_err(|e| StoreError::Transfer(e.to_string()))?;
        debug!("Copied {} rows into {}", copied, staging);

        let updates = columns
            .iter()
            .map(|c| format!("{0} = excluded.{0}", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let merged = sqlx::query(&format!(
            "INSERT INTO {target} ({cols}) SELECT {cols} FROM {staging} ON CONFLICT (date, market) DO UPDATE SET {updates}",
            target = target,
            cols = column_list,
            staging = staging,
            updates = updates
        ))
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Merge(e.to_string()))?
        .rows_affected();

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        info!("Upserted {} rows into {}", merged, table);
        Ok(merged)
    }

    /// # Summary
    /// 建表并创建 `(date, market)` 唯一索引，均为幂等操作。
    async fn ensure_schema(&self, table: &str) -> Result<(), StoreError> {
        let table = validate_identifier(table)?;
        let target = quote_ident(table);

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                date TIMESTAMPTZ NOT NULL,
                updated TIMESTAMPTZ NOT NULL,
                market TEXT NOT NULL,
                resolution TEXT NOT NULL,
                open_price DOUBLE PRECISION NOT NULL,
                close_price DOUBLE PRECISION NOT NULL,
                high_price DOUBLE PRECISION NOT NULL,
                low_price DOUBLE PRECISION NOT NULL,
                volume DOUBLE PRECISION NOT NULL,
                volume_usd DOUBLE PRECISION NOT NULL,
                trades BIGINT NOT NULL,
                starting_interest DOUBLE PRECISION NOT NULL
            )
            "#,
            target
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} (date, market)",
            quote_ident(&format!("{}_idx_date_market", table)),
            target
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!("Schema ready for {}", table);
        Ok(())
    }

    async fn market_extents(&self, table: &str) -> Result<Vec<MarketExtent>, StoreError> {
        let table = validate_identifier(table)?;
        let rows = sqlx::query_as::<_, (String, DateTime<Utc>, DateTime<Utc>)>(&format!(
            "SELECT market, MIN(date), MAX(date) FROM {} GROUP BY market ORDER BY market",
            quote_ident(table)
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(market, first_candle, last_candle)| MarketExtent {
                market,
                first_candle,
                last_candle,
            })
            .collect())
    }

    async fn truncate(&self, table: &str) -> Result<(), StoreError> {
        let table = validate_identifier(table)?;
        sqlx::query(&format!("TRUNCATE TABLE {} RESTART IDENTITY", quote_ident(table)))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        info!("Truncated {}", table);
        Ok(())
    }

    /// # Summary
    /// 加载 K 线数据。
    ///
    /// # Logic
    /// 1. 按时间区间与市场列表查询。
    /// 2. 结果按 `date`、`market` 升序。
    async fn load_candles(
        &self,
        table: &str,
        markets: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, StoreError> {
        let table = validate_identifier(table)?;
        let rows = sqlx::query_as::<_, CandleRow>(&format!(
            r#"
            SELECT date, updated, market, resolution, open_price, close_price,
                   high_price, low_price, volume, volume_usd, trades, starting_interest
            FROM {}
            WHERE date BETWEEN $1 AND $2 AND market = ANY($3)
            ORDER BY date ASC, market ASC
            "#,
            quote_ident(table)
        ))
        .bind(start)
        .bind(end)
        .bind(markets)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.into_iter().map(row_to_candle).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candlekeep_core::testing::candle;
    use chrono::TimeZone;

    #[test]
    fn test_dedupe_by_key_keeps_last() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap();
        let batch = vec![
            candle("ETH-USD", t, 1.0),
            candle("BTC-USD", t, 2.0),
            candle("ETH-USD", t, 3.0),
        ];
        let rows = dedupe_by_key(&batch);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].market, "BTC-USD");
        assert_eq!(rows[1].close_price, 3.0);
    }

    #[tokio::test]
    async fn test_invalid_table_rejected_before_connecting() {
        let config = candlekeep_core::config::AppConfig::default().database;
        let pool = crate::config::connect_lazy(&config).unwrap();
        let store = PgCandleStore::new(pool);
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap();

        let err = store
            .upsert_candles("candles; DROP TABLE x", &[candle("BTC-USD", t, 1.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidIdentifier(_)));
        assert!(matches!(
            store.truncate("bad-name").await,
            Err(StoreError::InvalidIdentifier(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let config = candlekeep_core::config::AppConfig::default().database;
        let store = PgCandleStore::new(crate::config::connect_lazy(&config).unwrap());
        assert_eq!(store.upsert_candles("dydx_candles", &[]).await.unwrap(), 0);
    }
}
