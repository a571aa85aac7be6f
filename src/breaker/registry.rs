//! Per-dependency breaker registry.
//!
//! Call sites share one breaker per dependency name, so failures seen by
//! one part of the application open the circuit for every other part.
//! The registry is owned by the application context, not a module-level
//! global.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::clock::Clock;

use super::{BreakerConfig, BreakerStats, CircuitBreaker};

/// Lazily constructs and memoizes one [`CircuitBreaker`] per dependency
/// name.
pub struct BreakerRegistry {
    defaults: BreakerConfig,
    clock: Arc<dyn Clock>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Creates an empty registry; breakers are built on first use with
    /// the given defaults.
    #[must_use]
    pub fn new(defaults: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            defaults,
            clock,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the breaker for `name`, constructing it with the default
    /// config on first request.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_with(name, self.defaults)
    }

    /// Returns the breaker for `name`, constructing it with `config` on
    /// first request. An already-constructed breaker keeps its original
    /// config.
    pub fn get_with(&self, name: &str, config: BreakerConfig) -> Arc<CircuitBreaker> {
        let mut breakers = self.lock();
        if let Some(breaker) = breakers.get(name) {
            return Arc::clone(breaker);
        }
        let breaker = Arc::new(CircuitBreaker::new(name, config, Arc::clone(&self.clock)));
        breakers.insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Drives every breaker's open → half-open monitor one step.
    pub fn tick_all(&self) {
        let breakers: Vec<_> = self.lock().values().cloned().collect();
        for breaker in breakers {
            breaker.tick();
        }
    }

    /// Stats snapshots for every constructed breaker, sorted by name.
    #[must_use]
    pub fn stats(&self) -> Vec<BreakerStats> {
        let mut all: Vec<_> = self.lock().values().map(|b| b.stats()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<CircuitBreaker>>> {
        self.breakers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::clock::ManualClock;

    fn registry() -> BreakerRegistry {
        BreakerRegistry::new(
            BreakerConfig {
                failure_threshold: 2,
                ..BreakerConfig::default()
            },
            Arc::new(ManualClock::epoch()),
        )
    }

    #[test]
    fn same_name_shares_state() {
        let registry = registry();

        let a = registry.get("weather");
        let _ = a.execute(|| Err::<(), _>("boom"));
        let _ = a.execute(|| Err::<(), _>("boom"));

        // A second call site sees the circuit the first one opened.
        let b = registry.get("weather");
        assert!(!b.is_available());
    }

    #[test]
    fn distinct_names_are_independent() {
        let registry = registry();

        let weather = registry.get("weather");
        let _ = weather.execute(|| Err::<(), _>("boom"));
        let _ = weather.execute(|| Err::<(), _>("boom"));

        assert!(!registry.get("weather").is_available());
        assert!(registry.get("tides").is_available());
    }

    #[test]
    fn get_with_applies_config_only_on_first_construction() {
        let registry = registry();
        let custom = BreakerConfig {
            failure_threshold: 7,
            ..BreakerConfig::default()
        };

        let first = registry.get_with("api", custom);
        assert_eq!(first.config().failure_threshold, 7);

        // Already constructed: the custom config is not replaced.
        let second = registry.get_with(
            "api",
            BreakerConfig {
                failure_threshold: 1,
                ..BreakerConfig::default()
            },
        );
        assert_eq!(second.config().failure_threshold, 7);
    }

    #[test]
    fn stats_lists_all_breakers_sorted() {
        let registry = registry();
        registry.get("tides");
        registry.get("api");

        let stats = registry.stats();
        let names: Vec<_> = stats.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["api", "tides"]);
    }
}
