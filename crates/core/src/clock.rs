// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time source abstraction so the run loop's timestamped status messages are
//! testable.

/// Source of the current time as unix epoch seconds.
pub trait Clock {
    fn now(&self) -> i64;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Format an epoch timestamp as `YYYY-MM-DD HH:MM` (UTC), the granularity
/// used to suffix long-lived status messages.
pub fn minute_stamp(epoch_secs: i64) -> String {
    match chrono::DateTime::from_timestamp(epoch_secs, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => String::from("0000-00-00 00:00"),
    }
}

/// Manually-advanced clock for tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone, Default)]
pub struct FakeClock(std::sync::Arc<std::sync::atomic::AtomicI64>);

#[cfg(any(test, feature = "test-support"))]
impl FakeClock {
    pub fn at(epoch_secs: i64) -> Self {
        Self(std::sync::Arc::new(std::sync::atomic::AtomicI64::new(epoch_secs)))
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set(&self, epoch_secs: i64) {
        self.0.store(epoch_secs, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Clock for FakeClock {
    fn now(&self) -> i64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
