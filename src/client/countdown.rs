//! 1 小时缓存倒计时

use std::time::{Duration, Instant};

/// 缓存窗口，与上游 `ttl: 1h` 一致
pub const CACHE_WINDOW: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheCountdown {
    pub anchor: Instant,
    pub remaining_secs: u64,
}

/// 收到缓存指标时计算倒计时
///
/// 无锚点时以 `now` 为锚点；距锚点超过窗口时重新锚定；否则返回剩余秒数。
pub fn cache_countdown(now: Instant, anchor: Option<Instant>) -> CacheCountdown {
    match anchor {
        Some(anchor) if now.saturating_duration_since(anchor) <= CACHE_WINDOW => CacheCountdown {
            anchor,
            remaining_secs: remaining_secs(now, anchor),
        },
        _ => CacheCountdown {
            anchor: now,
            remaining_secs: CACHE_WINDOW.as_secs(),
        },
    }
}

/// 不重新锚定的剩余秒数，最小为 0；已过时间按整秒计
pub fn remaining_secs(now: Instant, anchor: Instant) -> u64 {
    CACHE_WINDOW
        .as_secs()
        .saturating_sub(now.saturating_duration_since(anchor).as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_metrics_anchors() {
        let t0 = Instant::now();
        let c = cache_countdown(t0, None);
        assert_eq!(c.anchor, t0);
        assert_eq!(c.remaining_secs, 3600);
    }

    #[test]
    fn test_countdown_sequence() {
        let t0 = Instant::now();
        let first = cache_countdown(t0, None);
        let second = cache_countdown(t0 + Duration::from_secs(500), Some(first.anchor));
        assert_eq!(second.remaining_secs, 3100);
        assert_eq!(second.anchor, t0);

        let late = t0 + Duration::from_secs(4000);
        let third = cache_countdown(late, Some(second.anchor));
        assert_eq!(third.remaining_secs, 3600);
        assert_eq!(third.anchor, late);
    }

    #[test]
    fn test_window_boundary() {
        let t0 = Instant::now();
        let at_edge = cache_countdown(t0 + CACHE_WINDOW, Some(t0));
        assert_eq!(at_edge.anchor, t0);
        assert_eq!(at_edge.remaining_secs, 0);
    }

    #[test]
    fn test_remaining_never_negative() {
        let t0 = Instant::now();
        assert_eq!(remaining_secs(t0 + Duration::from_secs(9000), t0), 0);
        assert_eq!(remaining_secs(t0 + Duration::from_millis(1500), t0), 3599);
    }

    #[test]
    fn test_fractional_elapsed_counts_whole_seconds() {
        let t0 = Instant::now();
        assert_eq!(remaining_secs(t0 + Duration::from_micros(1), t0), 3600);
        let c = cache_countdown(t0 + Duration::from_millis(500_300), Some(t0));
        assert_eq!(c.remaining_secs, 3100);
    }
}
