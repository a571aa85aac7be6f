//! The retention sweep itself.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::clock::Clock;
use crate::kv::KvStore;

use super::record::record_timestamp;
use super::{
    CleanupResult, CleanupSuggestion, Priority, Result, RetentionPolicy, StorageStats, Urgency,
};

const MS_PER_DAY: i64 = 86_400_000;
const HISTORY_CAP: usize = 50;
const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

/// Sweeps the key-value namespace according to per-module policies and
/// keeps a bounded history of what was removed.
pub struct RetentionManager {
    store: KvStore,
    clock: Arc<dyn Clock>,
    policies: Vec<RetentionPolicy>,
    history: Vec<CleanupResult>,
    quota_bytes: u64,
}

impl RetentionManager {
    /// Creates a manager over the given store with the default policy
    /// set.
    #[must_use]
    pub fn new(store: KvStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            policies: RetentionPolicy::defaults(),
            history: Vec::new(),
            quota_bytes: DEFAULT_QUOTA_BYTES,
        }
    }

    /// The underlying key-value store, for hosts writing tracked entries.
    #[must_use]
    pub fn store(&self) -> &KvStore {
        &self.store
    }

    /// Replaces the active policy set. Duplicate module names collapse to
    /// the last occurrence.
    pub fn set_policies(&mut self, policies: Vec<RetentionPolicy>) {
        self.policies.clear();
        for policy in policies {
            self.add_policy(policy);
        }
    }

    /// Upserts one policy by module name.
    pub fn add_policy(&mut self, policy: RetentionPolicy) {
        if let Some(existing) = self
            .policies
            .iter_mut()
            .find(|p| p.module == policy.module)
        {
            *existing = policy;
        } else {
            self.policies.push(policy);
        }
    }

    /// The active policy set.
    #[must_use]
    pub fn policies(&self) -> &[RetentionPolicy] {
        &self.policies
    }

    /// Overrides the assumed storage quota, e.g. from a host-measured
    /// estimate. The default is 5 MiB.
    pub fn set_quota(&mut self, bytes: u64) {
        self.quota_bytes = bytes;
    }

    /// Sweeps every module, removing expired entries.
    ///
    /// With `force`, low-priority modules lose every entry regardless of
    /// age (the emergency near-capacity mode). Entries whose JSON cannot
    /// be parsed are removed only when `force` is set or the policy is
    /// low-priority; otherwise they are retained as still-useful data.
    ///
    /// A module whose storage errors out is logged and skipped; one
    /// module's corruption never aborts the sweep of the rest. Non-empty
    /// results are appended to the bounded history and returned.
    pub fn run_cleanup(&mut self, force: bool) -> Vec<CleanupResult> {
        let now = self.clock.now();
        let policies = self.policies.clone();
        let mut results = Vec::new();
        for policy in &policies {
            match self.sweep_module(policy, force, now) {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        module = %policy.module,
                        error = %err,
                        "retention sweep failed for module, continuing"
                    );
                }
            }
        }
        for result in &results {
            self.history.push(result.clone());
        }
        if self.history.len() > HISTORY_CAP {
            let excess = self.history.len() - HISTORY_CAP;
            self.history.drain(..excess);
        }
        results
    }

    /// Cleanup results recorded so far, oldest first, capped at 50.
    #[must_use]
    pub fn history(&self) -> &[CleanupResult] {
        &self.history
    }

    /// Usage totals across the namespace, UTF-16 storage approximation.
    pub fn storage_stats(&self) -> Result<StorageStats> {
        let entries = self.store.entries()?;
        let mut used = 0;
        let mut by_module = std::collections::BTreeMap::new();
        for (key, value) in &entries {
            let bytes = utf16_bytes(value);
            used += bytes;
            if let Some(policy) = self
                .policies
                .iter()
                .find(|p| key.starts_with(&p.key_prefix))
            {
                *by_module.entry(policy.module.clone()).or_insert(0) += bytes;
            }
        }
        Ok(StorageStats {
            used,
            quota: self.quota_bytes,
            by_module,
        })
    }

    /// Advises whether a cleanup is worth running. Never runs one.
    pub fn suggest_cleanup(&self) -> Result<CleanupSuggestion> {
        let stats = self.storage_stats()?;
        let ratio = stats.used as f64 / stats.quota.max(1) as f64;
        let suggestion = if ratio > 0.9 {
            CleanupSuggestion {
                should_clean: true,
                reason: format!("storage {:.0}% full, cleanup strongly advised", ratio * 100.0),
                urgency: Urgency::High,
            }
        } else if ratio > 0.7 {
            CleanupSuggestion {
                should_clean: true,
                reason: format!("storage {:.0}% full, cleanup advised", ratio * 100.0),
                urgency: Urgency::Medium,
            }
        } else {
            CleanupSuggestion {
                should_clean: false,
                reason: "storage usage is within bounds".into(),
                urgency: Urgency::Low,
            }
        };
        Ok(suggestion)
    }

    /// Serializes every parsable entry of the named modules into a JSON
    /// export document, so a caller can snapshot data before a
    /// destructive cleanup. Unparsable entries are skipped.
    pub fn export_before_cleanup(&self, modules: &[&str]) -> Result<String> {
        let mut exported = serde_json::Map::new();
        for name in modules {
            let Some(policy) = self.policies.iter().find(|p| p.module == *name) else {
                continue;
            };
            let mut items = Vec::new();
            for (key, value) in self.store.entries_with_prefix(&policy.key_prefix)? {
                if let Ok(parsed) = serde_json::from_str::<Value>(&value) {
                    items.push(json!({ "key": key, "value": parsed }));
                }
            }
            exported.insert((*name).to_string(), Value::Array(items));
        }
        let document = json!({
            "exported_at": self.clock.now().to_string(),
            "modules": exported,
        });
        Ok(serde_json::to_string_pretty(&document)?)
    }

    fn sweep_module(
        &self,
        policy: &RetentionPolicy,
        force: bool,
        now: jiff::Timestamp,
    ) -> Result<Option<CleanupResult>> {
        let max_age_ms = i64::from(policy.max_age_days) * MS_PER_DAY;
        let force_all = force && policy.priority == Priority::Low;
        let evict_unparsable = force || policy.priority == Priority::Low;

        let mut items_removed = 0_u32;
        let mut bytes_freed = 0_u64;
        for (key, value) in self.store.entries_with_prefix(&policy.key_prefix)? {
            let parsed = serde_json::from_str::<Value>(&value).ok();
            let evict = match parsed.as_ref().and_then(record_timestamp) {
                Some(ts) => {
                    force_all || now.as_millisecond() - ts.as_millisecond() > max_age_ms
                }
                None => evict_unparsable,
            };
            if evict {
                self.store.remove(&key)?;
                items_removed += 1;
                bytes_freed += utf16_bytes(&value);
            }
        }

        if items_removed == 0 {
            return Ok(None);
        }
        Ok(Some(CleanupResult {
            module: policy.module.clone(),
            items_removed,
            bytes_freed,
            timestamp: now,
        }))
    }
}

/// Stored-string size under the 2-bytes-per-character (UTF-16)
/// approximation.
fn utf16_bytes(s: &str) -> u64 {
    u64::try_from(s.encode_utf16().count()).unwrap_or(u64::MAX / 2) * 2
}
