use candlekeep_core::common::Resolution;
use candlekeep_core::common::time::FakeClockProvider;
use candlekeep_core::config::IngestConfig;
use candlekeep_core::market::entity::FetchWindow;
use candlekeep_core::market::error::MarketError;
use candlekeep_core::store::error::StoreError;
use candlekeep_core::store::port::CandleStore;
use candlekeep_core::testing::{MemCandleStore, MockSource, candle};
use candlekeep_ingest::error::IngestError;
use candlekeep_ingest::service::{IngestService, MarketSelection, SetupOutcome};
use candlekeep_market::series::SeriesStatus;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

const TABLE: &str = "dydx_candles";

fn at(hour: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
}

fn service(
    source: &Arc<MockSource>,
    store: &Arc<MemCandleStore>,
    now: DateTime<Utc>,
    config: IngestConfig,
) -> IngestService {
    IngestService::new(
        source.clone(),
        store.clone(),
        Arc::new(FakeClockProvider::new(now)),
        config,
        100,
    )
}

fn import_config(delete_existing: bool) -> IngestConfig {
    IngestConfig {
        historical_start: at(0),
        import_historical_on_start: true,
        delete_existing_on_import: delete_existing,
        ..IngestConfig::default()
    }
}

fn btc() -> Vec<String> {
    vec!["BTC-USD".to_string()]
}

#[tokio::test]
async fn test_ingest_window_writes_merged_batch() -> anyhow::Result<()> {
    let source = Arc::new(MockSource::new());
    source.with_hourly_history("BTC-USD", at(0), at(23), |_| 100.0);
    source.push_response("ETH-USD", Err(MarketError::from_status(500, "boom")));
    let store = Arc::new(MemCandleStore::new());
    store.ensure_schema(TABLE).await?;

    let service = service(&source, &store, at(13), IngestConfig::default());
    let markets = vec!["BTC-USD".to_string(), "ETH-USD".to_string()];
    let report = service
        .ingest_window(&markets, FetchWindow::trailing(at(13), 2, Resolution::Hour1))
        .await?;

    // 额外回溯的一个周期也会被写入
    assert_eq!(report.candles_fetched, 4);
    assert_eq!(report.rows_written, 4);
    assert!(matches!(report.statuses["ETH-USD"], SeriesStatus::Failed(_)));
    assert!(store.rows(TABLE).iter().all(|c| c.market == "BTC-USD"));
    Ok(())
}

#[tokio::test]
async fn test_ingest_window_propagates_store_failure() {
    let source = Arc::new(MockSource::new());
    source.with_hourly_history("BTC-USD", at(0), at(23), |_| 100.0);
    let store = Arc::new(MemCandleStore::new());

    let service = service(&source, &store, at(13), IngestConfig::default());
    let err = service
        .ingest_window(&btc(), FetchWindow::trailing(at(13), 2, Resolution::Hour1))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Store(StoreError::Schema(_))));
}

#[tokio::test]
async fn test_ingest_window_skips_empty_batch() -> anyhow::Result<()> {
    let source = Arc::new(MockSource::new());
    let store = Arc::new(MemCandleStore::new());
    store.ensure_schema(TABLE).await?;

    let service = service(&source, &store, at(13), IngestConfig::default());
    let report = service
        .ingest_window(&btc(), FetchWindow::trailing(at(13), 2, Resolution::Hour1))
        .await?;
    assert_eq!(report.rows_written, 0);
    assert_eq!(report.statuses["BTC-USD"], SeriesStatus::NoData);
    assert!(store.upsert_batches().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_resolve_markets() -> anyhow::Result<()> {
    let source = Arc::new(MockSource::new());
    source.with_market("SOL-USD", true);
    source.with_market("BTC-USD", true);
    source.with_market("DOGE-USD", false);
    let store = Arc::new(MemCandleStore::new());
    let service = service(&source, &store, at(13), IngestConfig::default());

    let online = MarketSelection::Online {
        top: None,
        lookback_days: 30,
    };
    assert_eq!(
        service.resolve_markets(&online).await?,
        vec!["BTC-USD".to_string(), "SOL-USD".to_string()]
    );
    assert_eq!(service.resolve_markets(&MarketSelection::Fixed(btc())).await?, btc());
    assert!(matches!(
        service.resolve_markets(&MarketSelection::Fixed(Vec::new())).await,
        Err(IngestError::NoMarkets)
    ));
    Ok(())
}

#[test]
fn test_selection_from_config() {
    let mut config = IngestConfig::default();
    config.top_markets = Some(5);
    assert_eq!(
        MarketSelection::from_config(&config),
        MarketSelection::Online {
            top: Some(5),
            lookback_days: 30
        }
    );
    config.markets = btc();
    assert_eq!(MarketSelection::from_config(&config), MarketSelection::Fixed(btc()));
}

#[tokio::test]
async fn test_setup_schema_only() -> anyhow::Result<()> {
    let source = Arc::new(MockSource::new());
    let store = Arc::new(MemCandleStore::new());
    let service = service(&source, &store, at(5), IngestConfig::default());

    let outcome = service.setup(&MarketSelection::Fixed(btc())).await?;
    assert!(matches!(outcome, SetupOutcome::SchemaOnly));
    assert!(store.has_table(TABLE));
    assert!(source.calls().is_empty());
    Ok(())
}

/// # Summary
/// 空表时从历史起点导入到当前周期边界。
#[tokio::test]
async fn test_setup_imports_history() -> anyhow::Result<()> {
    let source = Arc::new(MockSource::new());
    source.with_hourly_history("BTC-USD", at(0), at(23), |_| 1.0);
    let store = Arc::new(MemCandleStore::new());
    let now = at(5) + Duration::minutes(30);
    let service = service(&source, &store, now, import_config(false));

    let outcome = service.setup(&MarketSelection::Fixed(btc())).await?;
    let SetupOutcome::Imported(report) = outcome else {
        panic!("expected import, got {:?}", outcome);
    };
    assert_eq!(report.window.start, at(0));
    assert_eq!(report.window.end, at(5));
    assert_eq!(store.rows(TABLE).len(), 6);
    Ok(())
}

/// # Summary
/// 表中已有数据且不允许清空时，保留数据并跳过导入。
#[tokio::test]
async fn test_setup_keeps_existing_data() -> anyhow::Result<()> {
    let source = Arc::new(MockSource::new());
    source.with_hourly_history("BTC-USD", at(0), at(23), |_| 1.0);
    let store = Arc::new(MemCandleStore::new());
    store.ensure_schema(TABLE).await?;
    store
        .upsert_candles(TABLE, &[candle("OLD-USD", at(1), 7.0)])
        .await?;

    let service = service(&source, &store, at(5), import_config(false));
    let outcome = service.setup(&MarketSelection::Fixed(btc())).await?;

    assert!(matches!(outcome, SetupOutcome::KeptExisting { markets: 1 }));
    assert!(source.calls().is_empty());
    let rows = store.rows(TABLE);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].market, "OLD-USD");
    Ok(())
}

/// # Summary
/// 允许清空时，先清空再导入。
#[tokio::test]
async fn test_setup_truncates_before_import() -> anyhow::Result<()> {
    let source = Arc::new(MockSource::new());
    source.with_hourly_history("BTC-USD", at(0), at(23), |_| 1.0);
    let store = Arc::new(MemCandleStore::new());
    store.ensure_schema(TABLE).await?;
    store
        .upsert_candles(TABLE, &[candle("OLD-USD", at(1), 7.0)])
        .await?;

    let service = service(&source, &store, at(5), import_config(true));
    let outcome = service.setup(&MarketSelection::Fixed(btc())).await?;

    assert!(matches!(outcome, SetupOutcome::Imported(_)));
    let rows = store.rows(TABLE);
    assert_eq!(rows.len(), 6);
    assert!(rows.iter().all(|c| c.market == "BTC-USD"));
    Ok(())
}
