//! Circuit breakers for failing upstream dependencies.
//!
//! Each named dependency gets one breaker, shared across call sites via
//! the [`BreakerRegistry`]. A breaker wraps outbound calls, opens after
//! repeated failures so a dead dependency stops consuming requests, and
//! probes recovery after a cooldown.
//!
//! # States
//! ```text
//! Closed → Open:      failure count reaches the threshold
//! Open → Half-Open:   open timeout elapsed (monitor tick, or next call)
//! Half-Open → Closed: success count reaches the threshold
//! Half-Open → Open:   any single probe failure
//! ```
//!
//! There is no background timer: hosts drive the open → half-open
//! monitor by calling [`CircuitBreaker::tick`] (or
//! [`BreakerRegistry::tick_all`]) on a fixed interval.

mod instance;
mod registry;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use instance::{CircuitBreaker, SubscriptionId};
pub use registry::BreakerRegistry;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Normal operation: requests pass through.
    Closed,
    /// Dependency assumed down: requests fail fast.
    Open,
    /// Cooldown elapsed: trial requests probe for recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        };
        f.write_str(s)
    }
}

/// Tunables for one breaker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BreakerConfig {
    /// Consecutive-failure count that opens a closed breaker.
    pub failure_threshold: u32,
    /// Probe successes required to close a half-open breaker.
    pub success_threshold: u32,
    /// How long an open breaker rejects calls before probing.
    pub open_timeout_ms: i64,
    /// Cadence at which the host should call `tick`.
    pub monitor_interval_ms: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout_ms: 30_000,
            monitor_interval_ms: 5_000,
        }
    }
}

/// Rejection issued while a breaker is open. The only error a breaker
/// originates; everything else comes from the wrapped operation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("circuit '{name}' is open; retry in {retry_after_ms}ms")]
pub struct CircuitOpenError {
    /// The breaker's dependency name.
    pub name: String,
    /// Remaining wait before the breaker will probe again.
    pub retry_after_ms: i64,
}

/// Outcome of [`CircuitBreaker::execute`]: either the breaker refused to
/// place the call, or the wrapped operation's own error, passed through
/// verbatim.
#[derive(Debug)]
pub enum ExecuteError<E> {
    /// The breaker is open; the operation was never invoked.
    Open(CircuitOpenError),
    /// The operation ran and failed with its own error.
    Inner(E),
}

impl<E> From<CircuitOpenError> for ExecuteError<E> {
    fn from(err: CircuitOpenError) -> Self {
        Self::Open(err)
    }
}

impl<E: fmt::Display> fmt::Display for ExecuteError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(err) => fmt::Display::fmt(err, f),
            Self::Inner(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ExecuteError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open(err) => Some(err),
            Self::Inner(err) => Some(err),
        }
    }
}

/// Point-in-time snapshot of one breaker, as handed to subscribers and
/// returned by `stats()`.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    /// Dependency name the breaker guards.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Current failure count (decays on closed-state successes).
    pub failures: u32,
    /// Probe successes recorded since entering half-open.
    pub successes: u32,
    /// Most recent recorded failure, if any.
    pub last_failure: Option<jiff::Timestamp>,
    /// Most recent recorded success, if any.
    pub last_success: Option<jiff::Timestamp>,
    /// Every `execute` call ever made, including fast-failed ones.
    pub total_requests: u64,
    /// `failures / total_requests`, or 0.0 before any request.
    pub failure_rate: f64,
}
