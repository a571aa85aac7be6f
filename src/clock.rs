//! Time source abstraction.
//!
//! Breaker timeouts and retention ages are all judged against an injected
//! clock rather than platform timer calls, so elapsed-time behavior is
//! testable without real waits. Hosts pass [`SystemClock`] in production
//! and [`ManualClock`] in tests or simulations.

use std::sync::atomic::{AtomicI64, Ordering};

use jiff::Timestamp;

/// A source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Timestamp;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A manually advanced clock, for tests and simulation hosts.
///
/// Time only moves when told to. Stored as epoch milliseconds, which is
/// also the granularity breaker timeouts and retention ages operate at.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at the given instant.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            now_ms: AtomicI64::new(start.as_millisecond()),
        }
    }

    /// Creates a clock frozen at the Unix epoch.
    #[must_use]
    pub fn epoch() -> Self {
        Self::new(Timestamp::UNIX_EPOCH)
    }

    /// Moves the clock forward by `ms` milliseconds.
    pub fn advance_ms(&self, ms: i64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jumps the clock to the given instant.
    pub fn set(&self, now: Timestamp) {
        self.now_ms.store(now.as_millisecond(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        // A millisecond count that came from a valid Timestamp is always
        // representable, so this cannot fail for advances within range.
        Timestamp::from_millisecond(self.now_ms.load(Ordering::SeqCst))
            .unwrap_or(Timestamp::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::epoch();
        assert_eq!(clock.now().as_millisecond(), 0);

        clock.advance_ms(30_001);
        assert_eq!(clock.now().as_millisecond(), 30_001);
    }

    #[test]
    fn manual_clock_set_jumps() {
        let clock = ManualClock::epoch();
        let target = Timestamp::new(1_000_000_000, 0).unwrap();
        clock.set(target);
        assert_eq!(clock.now(), target);
    }
}
