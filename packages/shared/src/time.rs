//! Time-related utilities with clock abstraction for testability.
//!
//! Timestamps are Unix milliseconds in UTC. They are rendered as RFC 3339
//! strings only at the wire boundary.

use std::{
    sync::atomic::{AtomicI64, Ordering},
    time::Duration,
};

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Clock trait for dependency injection and testing
pub trait Clock: Send + Sync {
    /// Get current Unix timestamp in UTC (milliseconds)
    fn now_millis(&self) -> i64;
}

/// System clock implementation (uses actual system time)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        now_millis()
    }
}

/// Manually driven clock for tests.
///
/// Starts at a fixed instant and only moves when told to, so elapsed-time
/// logic (token refill, expiry, idle sweeps) can be exercised without sleeping.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a new manual clock with the given timestamp
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    /// Jump to an absolute timestamp
    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(duration_to_millis(by), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Get current Unix timestamp in UTC (milliseconds)
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a `Duration` to whole milliseconds, saturating at `i64::MAX`
pub fn duration_to_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Convert Unix timestamp (milliseconds) to RFC 3339 format in UTC
///
/// Out-of-range values render as the Unix epoch.
pub fn timestamp_to_rfc3339(timestamp_millis: i64) -> String {
    let dt: DateTime<Utc> = Utc
        .timestamp_millis_opt(timestamp_millis)
        .single()
        .unwrap_or_default();
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 / ISO-8601 timestamp into Unix milliseconds
pub fn parse_rfc3339(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_returns_non_zero_timestamp() {
        // テスト項目: SystemClock が 0 以外のタイムスタンプを返す
        // given (前提条件):
        let clock = SystemClock;

        // when (操作):
        let timestamp = clock.now_millis();

        // then (期待する結果):
        assert!(timestamp > 0);
    }

    #[test]
    fn test_manual_clock_advances_only_when_told() {
        // テスト項目: ManualClock は advance を呼んだときだけ進む
        // given (前提条件):
        let clock = ManualClock::new(1_000);

        // when (操作):
        let before = clock.now_millis();
        clock.advance(Duration::from_secs(120));
        let after = clock.now_millis();

        // then (期待する結果):
        assert_eq!(before, 1_000);
        assert_eq!(after, 121_000);
    }

    #[test]
    fn test_manual_clock_set() {
        // テスト項目: ManualClock を任意の時刻に設定できる
        // given (前提条件):
        let clock = ManualClock::new(0);

        // when (操作):
        clock.set(9_876_543_210_987);

        // then (期待する結果):
        assert_eq!(clock.now_millis(), 9_876_543_210_987);
    }

    #[test]
    fn test_timestamp_to_rfc3339_format() {
        // テスト項目: タイムスタンプが UTC の RFC 3339 形式に変換される
        // given (前提条件):
        // 2023-01-01 00:00:00.123 UTC
        let timestamp = 1_672_531_200_123;

        // when (操作):
        let result = timestamp_to_rfc3339(timestamp);

        // then (期待する結果):
        assert_eq!(result, "2023-01-01T00:00:00.123Z");
    }

    #[test]
    fn test_parse_rfc3339_accepts_offsets() {
        // テスト項目: オフセット付きの ISO-8601 文字列をミリ秒に変換できる
        // given (前提条件):
        let jst = "2023-01-01T09:00:00+09:00";

        // when (操作):
        let result = parse_rfc3339(jst);

        // then (期待する結果):
        assert_eq!(result, Some(1_672_531_200_000));
    }

    #[test]
    fn test_parse_rfc3339_rejects_garbage() {
        // テスト項目: 不正な文字列は None になる
        // given (前提条件):
        let value = "yesterday";

        // when (操作):
        let result = parse_rfc3339(value);

        // then (期待する結果):
        assert_eq!(result, None);
    }
}
