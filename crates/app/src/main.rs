mod logging;
mod settings;

use std::sync::Arc;

use candlekeep_core::common::time::{RealTimeProvider, TimeProvider};
use candlekeep_core::market::port::MAX_PAGE_LIMIT;
use candlekeep_feed::dydx::DydxProvider;
use candlekeep_ingest::scheduler::Scheduler;
use candlekeep_ingest::service::{IngestService, MarketSelection, SetupOutcome};
use candlekeep_store::candles::PgCandleStore;
use tracing::{error, info, warn};

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化所有具体实现组件并通过 Arc<dyn Trait> 注入到 IngestService。
///
/// # Logic
/// 1. 加载配置（首个命令行参数为配置文件路径）并初始化日志。
/// 2. 实例化基础设施层（Feed、Store）。
/// 3. 构造应用服务层并执行启动导入流程。
/// 4. 监听中断信号，收到后在当前轮结束时停止。
/// 5. 运行调度循环直到停止。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 配置与日志
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| settings::DEFAULT_CONFIG_PATH.to_string());
    let config = settings::load(&path)?;
    let _log_guard = logging::init(&config.log);
    info!("Candlekeep starting with config {}", path);

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A TLS crypto provider was already installed");
    }

    // 2. 基础设施层
    let clock: Arc<dyn TimeProvider> = Arc::new(RealTimeProvider);
    let source = Arc::new(DydxProvider::new(&config.exchange)?);
    let pool = candlekeep_store::config::connect(&config.database).await?;
    let store = Arc::new(PgCandleStore::new(pool.clone()));

    // 3. 应用服务层
    let service = Arc::new(IngestService::new(
        source,
        store,
        clock.clone(),
        config.ingest.clone(),
        config.exchange.page_limit.clamp(1, MAX_PAGE_LIMIT),
    ));
    let selection = MarketSelection::from_config(&config.ingest);

    match service.setup(&selection).await? {
        SetupOutcome::SchemaOnly => info!("Table {} ready", config.ingest.table_name),
        SetupOutcome::KeptExisting { markets } => {
            info!("Kept existing data for {} markets", markets)
        }
        SetupOutcome::Imported(report) => info!(
            "Historical import wrote {} rows ({} markets)",
            report.rows_written,
            report.statuses.len()
        ),
    }

    // 4. 中断信号
    let scheduler = Scheduler::new(service, clock);
    let stop = scheduler.stop_handle();
    let signal_task = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping after the current cycle");
                stop.request_stop();
            }
            Err(e) => error!("Unable to listen for shutdown signal: {}", e),
        }
    });

    // 5. 调度循环
    let cycles = scheduler
        .run_forever(
            &selection,
            config.ingest.resolution,
            config.ingest.poll_interval_secs,
        )
        .await;

    signal_task.abort();
    pool.close().await;
    info!("Candlekeep exited after {} cycles", cycles);
    Ok(())
}
