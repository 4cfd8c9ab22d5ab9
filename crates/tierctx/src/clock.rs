//! Time sources for recency tracking.
//!
//! Recency, retention and id generation all read time through the [`Clock`]
//! trait so tests can pin it with a [`ManualClock`] and get reproducible
//! eviction order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Millisecond clock.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Wall-clock time via `chrono`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Manually advanced clock. Cloning shares the underlying time.
///
/// Time only moves forward.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    current_ms: Arc<AtomicU64>,
}

impl ManualClock {
    /// A clock starting at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock starting at `start_ms`.
    pub fn at_ms(start_ms: u64) -> Self {
        Self {
            current_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Advance by `ms` milliseconds and return the new time.
    pub fn advance_ms(&self, ms: u64) -> u64 {
        self.current_ms.fetch_add(ms, Ordering::SeqCst) + ms
    }

    /// Advance by whole seconds.
    pub fn advance_secs(&self, secs: u64) -> u64 {
        self.advance_ms(secs.saturating_mul(1000))
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }
}

/// Format a millisecond timestamp as RFC 3339 for reports.
pub fn format_ms(ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_shared() {
        let clock = ManualClock::at_ms(1_000);
        let other = clock.clone();
        assert_eq!(clock.advance_secs(2), 3_000);
        assert_eq!(other.now_ms(), 3_000);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn format_ms_epoch() {
        assert!(format_ms(0).starts_with("1970-01-01T00:00:00"));
    }
}
