//! One breaker guarding one named dependency.
//!
//! All state lives behind a single mutex; every transition is driven by
//! one awaited call outcome (or an explicit tick/override), so observers
//! never see interleaved half-applied transitions. Listeners are invoked
//! after the lock is released, so a listener may call back into the
//! breaker without deadlocking.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jiff::Timestamp;

use crate::clock::Clock;

use super::{BreakerConfig, BreakerStats, CircuitOpenError, CircuitState, ExecuteError};

type Listener = Arc<dyn Fn(&BreakerStats) + Send + Sync>;

/// Handle returned by [`CircuitBreaker::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Failure-isolation state machine for one named dependency.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    last_failure: Option<Timestamp>,
    last_success: Option<Timestamp>,
    total_requests: u64,
    listeners: Vec<(u64, Listener)>,
    next_listener: u64,
}

impl CircuitBreaker {
    /// Creates a closed breaker for the named dependency.
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                last_failure: None,
                last_success: None,
                total_requests: 0,
                listeners: Vec::new(),
                next_listener: 0,
            }),
        }
    }

    /// The dependency name this breaker guards.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The breaker's configuration.
    #[must_use]
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Runs `op` through the breaker.
    ///
    /// Counts toward `total_requests` unconditionally. While open and
    /// inside the cooldown window the call fails fast with
    /// [`CircuitOpenError`] and `op` is never invoked; once the window
    /// has elapsed the breaker moves to half-open and lets the call
    /// through as a probe. The operation's own error, if any, is
    /// returned verbatim.
    pub fn execute<T, E, F>(&self, op: F) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        {
            let mut inner = self.lock();
            inner.total_requests += 1;
            if inner.state == CircuitState::Open {
                let now = self.clock.now();
                let elapsed = elapsed_ms(inner.last_failure, now);
                if elapsed < self.config.open_timeout_ms {
                    return Err(CircuitOpenError {
                        name: self.name.clone(),
                        retry_after_ms: self.config.open_timeout_ms - elapsed,
                    }
                    .into());
                }
                self.enter_half_open(&mut inner);
            }
        }

        match op() {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(ExecuteError::Inner(err))
            }
        }
    }

    /// Advances the open → half-open monitor one step.
    ///
    /// Hosts call this on a fixed interval (`monitor_interval_ms`); it
    /// does nothing unless the breaker is open and the cooldown has
    /// elapsed.
    pub fn tick(&self) {
        let notify = {
            let mut inner = self.lock();
            if inner.state == CircuitState::Open
                && elapsed_ms(inner.last_failure, self.clock.now()) >= self.config.open_timeout_ms
            {
                self.enter_half_open(&mut inner);
                Some(snapshot(&self.name, &inner))
            } else {
                None
            }
        };
        if let Some((stats, listeners)) = notify {
            dispatch(&stats, &listeners);
        }
    }

    /// True unless the breaker is open.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.lock().state != CircuitState::Open
    }

    /// Point-in-time stats snapshot.
    #[must_use]
    pub fn stats(&self) -> BreakerStats {
        let inner = self.lock();
        snapshot(&self.name, &inner).0
    }

    /// Operational override: force the breaker open.
    pub fn trip(&self) {
        let (stats, listeners) = {
            let mut inner = self.lock();
            inner.state = CircuitState::Open;
            inner.last_failure = Some(self.clock.now());
            tracing::debug!(breaker = %self.name, "tripped open by operator");
            snapshot(&self.name, &inner)
        };
        dispatch(&stats, &listeners);
    }

    /// Operational override: force the breaker closed and clear counters.
    pub fn reset(&self) {
        let (stats, listeners) = {
            let mut inner = self.lock();
            inner.state = CircuitState::Closed;
            inner.failures = 0;
            inner.successes = 0;
            tracing::debug!(breaker = %self.name, "reset closed by operator");
            snapshot(&self.name, &inner)
        };
        dispatch(&stats, &listeners);
    }

    /// Registers a stats listener.
    ///
    /// The listener is invoked immediately with the current stats, then
    /// again after every state-affecting event, until unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&BreakerStats) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let (id, stats) = {
            let mut inner = self.lock();
            let id = inner.next_listener;
            inner.next_listener += 1;
            inner.listeners.push((id, Arc::clone(&listener)));
            (id, snapshot(&self.name, &inner).0)
        };
        listener(&stats);
        SubscriptionId(id)
    }

    /// Removes a previously registered listener. Unknown ids are a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.lock().listeners.retain(|(lid, _)| *lid != id.0);
    }

    fn record_success(&self) {
        let (stats, listeners) = {
            let mut inner = self.lock();
            match inner.state {
                CircuitState::Closed => {
                    // Decay toward zero so isolated failures age out.
                    inner.failures = inner.failures.saturating_sub(1);
                }
                CircuitState::HalfOpen => {
                    inner.successes += 1;
                    if inner.successes >= self.config.success_threshold {
                        inner.state = CircuitState::Closed;
                        inner.failures = 0;
                        inner.successes = 0;
                        tracing::debug!(breaker = %self.name, "closed after successful probes");
                    }
                }
                // A call in flight when the breaker was tripped; only the
                // timestamp is worth recording.
                CircuitState::Open => {}
            }
            inner.last_success = Some(self.clock.now());
            snapshot(&self.name, &inner)
        };
        dispatch(&stats, &listeners);
    }

    fn record_failure(&self) {
        let (stats, listeners) = {
            let mut inner = self.lock();
            inner.last_failure = Some(self.clock.now());
            match inner.state {
                CircuitState::Closed => {
                    inner.failures += 1;
                    if inner.failures >= self.config.failure_threshold {
                        inner.state = CircuitState::Open;
                        tracing::debug!(
                            breaker = %self.name,
                            failures = inner.failures,
                            "opened after repeated failures"
                        );
                    }
                }
                CircuitState::HalfOpen => {
                    inner.state = CircuitState::Open;
                    inner.successes = 0;
                    tracing::debug!(breaker = %self.name, "probe failed, reopened");
                }
                CircuitState::Open => {}
            }
            snapshot(&self.name, &inner)
        };
        dispatch(&stats, &listeners);
    }

    fn enter_half_open(&self, inner: &mut Inner) {
        inner.state = CircuitState::HalfOpen;
        inner.successes = 0;
        tracing::debug!(breaker = %self.name, "cooldown elapsed, probing");
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic mid-transition leaves no torn state worth preserving;
        // recover the guard rather than propagating the poison.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn elapsed_ms(since: Option<Timestamp>, now: Timestamp) -> i64 {
    since.map_or(i64::MAX, |t| {
        now.as_millisecond().saturating_sub(t.as_millisecond())
    })
}

fn snapshot(name: &str, inner: &Inner) -> (BreakerStats, Vec<Listener>) {
    let failure_rate = if inner.total_requests == 0 {
        0.0
    } else {
        f64::from(inner.failures) / inner.total_requests as f64
    };
    let stats = BreakerStats {
        name: name.to_string(),
        state: inner.state,
        failures: inner.failures,
        successes: inner.successes,
        last_failure: inner.last_failure,
        last_success: inner.last_success,
        total_requests: inner.total_requests,
        failure_rate,
    };
    let listeners = inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
    (stats, listeners)
}

fn dispatch(stats: &BreakerStats, listeners: &[Listener]) {
    for listener in listeners {
        listener(stats);
    }
}
