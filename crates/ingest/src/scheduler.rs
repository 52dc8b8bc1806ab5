use crate::service::{IngestService, MarketSelection};
use candlekeep_core::common::Resolution;
use candlekeep_core::common::time::{TimeProvider, next_boundary_after};
use candlekeep_core::market::entity::FetchWindow;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// 控制循环的默认轮询间隔。
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// 每轮回溯的周期数：最近收盘的周期在收盘后仍可能被交易所修订。
pub const OVERLAP_INTERVALS: i32 = 2;

/// # Summary
/// 调度器状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    // 等待到达目标边界
    Waiting(DateTime<Utc>),
    // 正在执行目标边界对应的一轮采集
    Executing(DateTime<Utc>),
    // 已响应停止请求
    Stopped,
}

/// # Summary
/// 停止请求句柄，可跨任务克隆。调度器只在两轮之间检查它。
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// # Summary
/// 严格晚于上一目标的最小边界。以上一目标而非当前时间为基准，避免调度漂移。
pub fn next_target(previous: DateTime<Utc>, interval_secs: i64) -> DateTime<Utc> {
    next_boundary_after(previous, interval_secs)
}

/// # Summary
/// 按整点边界驱动采集循环的调度器。
///
/// # Invariants
/// - 目标时间总是轮询周期（自 UTC 纪元起）的整数倍。
/// - 停止请求只在两轮之间生效，进行中的抓取与写入总会完成。
/// - 除停止请求外，任何错误都不会终止循环。
pub struct Scheduler {
    service: Arc<IngestService>,
    clock: Arc<dyn TimeProvider>,
    stop: StopHandle,
    tick: Duration,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(service: Arc<IngestService>, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            service,
            clock,
            stop: StopHandle::default(),
            tick: DEFAULT_TICK,
            state: Mutex::new(SchedulerState::Stopped),
        }
    }

    /// 覆盖控制循环的轮询间隔。
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn request_stop(&self) {
        info!("Stop requested, finishing current cycle");
        self.stop.request_stop();
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SchedulerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// # Summary
    /// 持续运行采集循环，直到收到停止请求。
    ///
    /// # Logic
    /// 1. 首个目标为启动时间之后的下一个边界。
    /// 2. 每个 tick 检查停止请求；时间未到目标则继续等待。
    /// 3. 到达目标后执行一轮，窗口为以目标为终点的最近两个周期。
    /// 4. 下一目标为上一目标之后的边界；若已过期则记录漂移并立即执行。
    ///
    /// # Arguments
    /// * `selection` - 每轮的市场来源。
    /// * `resolution` - K 线周期。
    /// * `poll_interval_secs` - 轮询周期（秒）。
    ///
    /// # Returns
    /// * 完成的轮数。
    pub async fn run_forever(
        &self,
        selection: &MarketSelection,
        resolution: Resolution,
        poll_interval_secs: u64,
    ) -> u64 {
        let interval = i64::try_from(poll_interval_secs.max(1)).unwrap_or(i64::MAX);
        let mut target = next_boundary_after(self.clock.now(), interval);
        let mut cycles = 0u64;
        self.set_state(SchedulerState::Waiting(target));
        info!("Scheduler started, waiting until {}", target);

        while !self.stop.is_stop_requested() {
            if self.clock.now() < target {
                tokio::time::sleep(self.tick).await;
                continue;
            }

            self.set_state(SchedulerState::Executing(target));
            info!("Target {} reached, starting cycle", target);
            self.run_cycle(selection, resolution, target).await;
            cycles += 1;

            let next = next_target(target, interval);
            let now = self.clock.now();
            if next <= now {
                warn!(
                    "Schedule drift: cycle for {} finished at {}, next target {} already passed",
                    target, now, next
                );
            } else {
                info!("Waiting until {}", next);
            }
            target = next;
            self.set_state(SchedulerState::Waiting(target));
        }

        self.set_state(SchedulerState::Stopped);
        info!("Scheduler stopped after {} cycles", cycles);
        cycles
    }

    /// 执行一轮采集，所有错误只记录日志。
    async fn run_cycle(
        &self,
        selection: &MarketSelection,
        resolution: Resolution,
        target: DateTime<Utc>,
    ) {
        let markets = match self.service.resolve_markets(selection).await {
            Ok(markets) => markets,
            Err(e) => {
                error!("Skipping cycle for {}: unable to resolve markets: {}", target, e);
                return;
            }
        };

        let window = FetchWindow::trailing(target, OVERLAP_INTERVALS, resolution);
        match self.service.ingest_window(&markets, window).await {
            Ok(report) => info!(
                "Cycle for {} done: {} markets, {} candles, {} rows written (download {:?}, save {:?})",
                target,
                markets.len(),
                report.candles_fetched,
                report.rows_written,
                report.download,
                report.save
            ),
            Err(e) => error!("Cycle for {} failed: {}", target, e),
        }
    }
}
