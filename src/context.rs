//! Application-wide resilience context.
//!
//! One explicitly constructed object owns the breaker registry, the
//! offline store, and the retention manager. Constructed once at
//! startup and injected into call sites — the per-process-singleton
//! semantics without hidden global state.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::breaker::BreakerRegistry;
use crate::clock::Clock;
use crate::config::Config;
use crate::kv::KvStore;
use crate::offline::OfflineStore;
use crate::retention::RetentionManager;

/// Errors that can occur while opening the context.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("offline store: {0}")]
    Offline(#[from] crate::offline::OfflineError),

    #[error("retention store: {0}")]
    Kv(#[from] crate::kv::KvError),
}

/// The resilience layer's shared state: one breaker registry, one
/// offline store, one retention manager.
pub struct Context {
    pub breakers: BreakerRegistry,
    pub offline: OfflineStore,
    pub retention: RetentionManager,
}

impl Context {
    /// Opens the context under the given data directory, creating it if
    /// needed. Durable state lands in `offline.sqlite` and
    /// `retention.sqlite` inside the directory.
    pub fn open(
        config: &Config,
        data_dir: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ContextError> {
        let dir = data_dir.into();
        fs::create_dir_all(&dir)?;

        let breakers = BreakerRegistry::new(config.breaker, Arc::clone(&clock));
        let offline = OfflineStore::open(dir.join("offline.sqlite"), Arc::clone(&clock))?;

        let mut retention = RetentionManager::new(KvStore::open(dir.join("retention.sqlite"))?, clock);
        if let Some(policies) = &config.retention {
            retention.set_policies(policies.clone());
        }
        if let Some(quota) = config.quota_bytes {
            retention.set_quota(quota);
        }

        Ok(Self {
            breakers,
            offline,
            retention,
        })
    }

    /// Returns the default data root: `~/.breakwater/`.
    #[must_use]
    pub fn default_root() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".breakwater"))
    }

    /// Drives every breaker's open → half-open monitor one step. Hosts
    /// call this on the configured monitor interval.
    pub fn tick(&self) {
        self.breakers.tick_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tempfile::TempDir;

    use crate::breaker::CircuitState;
    use crate::clock::ManualClock;
    use crate::offline::{ActionPayload, EntityKind};

    #[test]
    fn open_wires_all_three_components() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::epoch());
        let mut ctx = Context::open(&Config::default(), dir.path().join("data"), clock).unwrap();

        // Breakers are shared by name.
        let api = ctx.breakers.get("api");
        assert_eq!(api.stats().state, CircuitState::Closed);

        // Offline store is usable.
        ctx.offline
            .add_pending_action(&ActionPayload {
                kind: "create_vessel".into(),
                params: json!({ "name": "MV Test" }),
            })
            .unwrap();
        assert_eq!(ctx.offline.pending_actions().unwrap().len(), 1);
        assert!(ctx.offline.entities(EntityKind::Routes).unwrap().is_empty());

        // Retention sweep runs over its own store.
        ctx.retention.store().set("temp_x", "not json").unwrap();
        let results = ctx.retention.run_cleanup(true);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn config_overrides_reach_the_components() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::epoch());
        let config = Config {
            quota_bytes: Some(64),
            ..Config::default()
        };
        let ctx = Context::open(&config, dir.path().join("data"), clock).unwrap();

        let stats = ctx.retention.storage_stats().unwrap();
        assert_eq!(stats.quota, 64);
    }

    #[test]
    fn tick_reaches_registered_breakers() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::epoch());
        let ctx = Context::open(&Config::default(), dir.path().join("data"), clock.clone()).unwrap();

        let api = ctx.breakers.get("api");
        api.trip();
        clock.advance_ms(api.config().open_timeout_ms + 1);
        ctx.tick();
        assert_eq!(api.stats().state, CircuitState::HalfOpen);
    }
}
