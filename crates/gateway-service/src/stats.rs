//! Windowed usage counters for the `Statistics` stream.
//!
//! Each active `Statistics` subscription owns one [`StatWindow`]; the window
//! accumulates counts between two consecutive snapshots and is replaced with
//! an empty one at every emission, so windows never overlap and never carry
//! state forward.

use chrono::Utc;
use proto_gen::gateway::Stat;
use std::collections::HashMap;

/// One authorized call, as published on the stat bus.
///
/// Created once per authorized call by the auth layer, regardless of how
/// many statistics subscribers are active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRecord {
    /// Consumer identity from call metadata.
    pub consumer: String,
    /// Fully-qualified method path.
    pub method: String,
    /// Unix timestamp in nanoseconds at authorization time.
    pub timestamp: i64,
}

/// Counters accumulated since the previous snapshot.
#[derive(Debug, Default)]
pub struct StatWindow {
    by_method: HashMap<String, u64>,
    by_consumer: HashMap<String, u64>,
}

impl StatWindow {
    /// Count one invocation record into the window.
    pub fn record(&mut self, record: &InvocationRecord) {
        *self.by_method.entry(record.method.clone()).or_insert(0) += 1;
        *self.by_consumer.entry(record.consumer.clone()).or_insert(0) += 1;
    }

    /// Emit an immutable snapshot stamped with `timestamp` and reset the
    /// window to empty in the same step.
    #[must_use]
    pub fn take_snapshot(&mut self, timestamp: i64) -> Stat {
        Stat {
            timestamp,
            by_method: std::mem::take(&mut self.by_method),
            by_consumer: std::mem::take(&mut self.by_consumer),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_method.is_empty() && self.by_consumer.is_empty()
    }
}

/// Current Unix time in nanoseconds.
///
/// Saturates to the chrono-representable range (year 2262); zero only if the
/// clock reports a time outside it.
#[must_use]
pub fn unix_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn record(consumer: &str, method: &str) -> InvocationRecord {
        InvocationRecord {
            consumer: consumer.to_string(),
            method: method.to_string(),
            timestamp: unix_nanos(),
        }
    }

    #[test]
    fn test_window_counts_by_method_and_consumer() {
        let mut window = StatWindow::default();
        window.record(&record("y", "x"));
        window.record(&record("y", "x"));
        window.record(&record("y", "x"));
        window.record(&record("z", "other"));

        let snapshot = window.take_snapshot(42);
        assert_eq!(snapshot.timestamp, 42);
        assert_eq!(snapshot.by_method.get("x"), Some(&3));
        assert_eq!(snapshot.by_method.get("other"), Some(&1));
        assert_eq!(snapshot.by_consumer.get("y"), Some(&3));
        assert_eq!(snapshot.by_consumer.get("z"), Some(&1));
    }

    #[test]
    fn test_snapshot_resets_window_atomically() {
        let mut window = StatWindow::default();
        window.record(&record("y", "x"));
        assert!(!window.is_empty());

        let first = window.take_snapshot(1);
        assert_eq!(first.by_method.get("x"), Some(&1));
        assert!(window.is_empty());

        // The next window starts from zero: no cross-window leakage.
        let second = window.take_snapshot(2);
        assert!(second.by_method.is_empty());
        assert!(second.by_consumer.is_empty());
    }

    #[test]
    fn test_empty_window_snapshot_is_empty() {
        let mut window = StatWindow::default();
        let snapshot = window.take_snapshot(7);
        assert!(snapshot.by_method.is_empty());
        assert!(snapshot.by_consumer.is_empty());
        assert_eq!(snapshot.timestamp, 7);
    }

    #[test]
    fn test_unix_nanos_is_monotonic_enough() {
        let a = unix_nanos();
        let b = unix_nanos();
        assert!(a > 0);
        assert!(b >= a);
    }
}
