use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::RwLock;

/// # Summary
/// 时间供给器接口，用于劫持和隔离物理系统时钟。
/// 调度器与市场发现必须通过此接口获取当前时间，以便在测试中替换。
pub trait TimeProvider: Send + Sync {
    /// 获取当前挂载的时间
    fn now(&self) -> DateTime<Utc>;
}

/// # Summary
/// 针对实盘运行的真实时钟，直接返回操作系统当前时间。
pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// # Summary
/// 测试专用虚拟时钟，允许主动拨快或回退时间。
///
/// # Invariants
/// - 并发安全：内部利用 `RwLock` 提供给多线程安全修改和读取时间的权限。
pub struct FakeClockProvider {
    current_time: RwLock<DateTime<Utc>>,
}

impl FakeClockProvider {
    /// 使用指定的初始时间创建虚拟时钟
    pub fn new(initial_time: DateTime<Utc>) -> Self {
        Self {
            current_time: RwLock::new(initial_time),
        }
    }

    /// 强制修改时钟的当前时间
    pub fn set_time(&self, new_time: DateTime<Utc>) {
        let mut time = self.current_time.write().unwrap_or_else(|e| e.into_inner());
        *time = new_time;
    }

    /// 将时钟向前拨动指定时长
    pub fn advance(&self, delta: Duration) {
        let mut time = self.current_time.write().unwrap_or_else(|e| e.into_inner());
        *time += delta;
    }
}

impl TimeProvider for FakeClockProvider {
    fn now(&self) -> DateTime<Utc> {
        *self.current_time.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// # Summary
/// 将时间向下对齐到自 UTC 纪元起 `interval_secs` 的整数倍。
///
/// # Arguments
/// * `instant`: 待对齐的时间。
/// * `interval_secs`: 对齐周期（秒），必须为正。
///
/// # Returns
/// 不晚于 `instant` 的最近边界。
pub fn align_down(instant: DateTime<Utc>, interval_secs: i64) -> DateTime<Utc> {
    let interval = interval_secs.max(1);
    let ts = instant.timestamp();
    let aligned = ts - ts.rem_euclid(interval);
    Utc.timestamp_opt(aligned, 0).single().unwrap_or(instant)
}

/// # Summary
/// 严格晚于 `instant` 的最小周期边界。
///
/// # Logic
/// 1. 先向下对齐得到不晚于 `instant` 的边界。
/// 2. 再加一个周期。恰好位于边界上的时间也会得到下一个边界。
pub fn next_boundary_after(instant: DateTime<Utc>, interval_secs: i64) -> DateTime<Utc> {
    align_down(instant, interval_secs) + Duration::seconds(interval_secs.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_down_to_hour() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 17, 43).unwrap();
        assert_eq!(
            align_down(t, 3600),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_boundary_is_strictly_later() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 17, 43).unwrap();
        assert_eq!(
            next_boundary_after(t, 3600),
            Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap()
        );

        let on_boundary = Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap();
        assert_eq!(
            next_boundary_after(on_boundary, 3600),
            Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_fake_clock_advance() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let clock = FakeClockProvider::new(start);
        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), start + Duration::minutes(90));
        clock.set_time(start);
        assert_eq!(clock.now(), start);
    }
}
