use candlekeep_core::market::entity::FetchWindow;

/// # Summary
/// 多市场抓取方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    // 每个市场一个并发任务
    Concurrent,
    // 按列表顺序逐个抓取
    Serial,
}

/// # Summary
/// 一次批量抓取的限流预算。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget {
    // 每个市场需要的页数
    pub pages_per_market: u64,
    pub mode: FetchMode,
}

/// # Summary
/// 估算覆盖窗口所需的页数：`ceil(ceil((end - start) / 周期) / page_limit)`。
///
/// # Arguments
/// * `window`: 抓取窗口。
/// * `page_limit`: 单页行数上限。
///
/// # Returns
/// 所需页数；空窗口或倒置窗口返回 0。
pub fn pages_required(window: &FetchWindow, page_limit: u32) -> u64 {
    let span = window.span().num_seconds();
    if span <= 0 {
        return 0;
    }
    let interval = window.resolution.seconds();
    let intervals = u64::try_from((span + interval - 1) / interval).unwrap_or(u64::MAX);
    let limit = u64::from(page_limit.max(1));
    intervals.div_ceil(limit)
}

/// # Summary
/// 决定多市场抓取能否并发。
///
/// # Logic
/// 1. 每个市场只需一页时，总请求量处于交易所短窗口配额之内，可并发。
/// 2. 否则严格串行，以吞吐换取不触发限流。
pub fn plan(window: &FetchWindow, page_limit: u32) -> RateBudget {
    let pages_per_market = pages_required(window, page_limit);
    let mode = if pages_per_market <= 1 {
        FetchMode::Concurrent
    } else {
        FetchMode::Serial
    };
    RateBudget {
        pages_per_market,
        mode,
    }
}
