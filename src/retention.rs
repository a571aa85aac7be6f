//! Policy-driven retention sweep for locally persisted data.
//!
//! Each module of the application owns a key prefix in the flat
//! [`crate::kv::KvStore`] namespace and a
//! policy saying how old its entries may become. The manager sweeps the
//! namespace, evicting expired entries, keeps a bounded history of what
//! each sweep removed, and offers advisory usage stats so the host can
//! decide when a sweep is worth running.
//!
//! Eviction is deliberately conservative: an entry whose JSON cannot be
//! parsed is retained unless the sweep is forced or the policy is
//! low-priority. Ambiguous content is treated as still-useful data.

mod manager;
mod record;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

pub use manager::RetentionManager;
pub use record::record_timestamp;

/// Errors from stats and export. `run_cleanup` itself absorbs per-module
/// storage errors (cleanup is best-effort advisory work).
#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    #[error("storage error: {0}")]
    Store(#[from] crate::kv::KvError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, RetentionError>;

/// How aggressively a module's data may be evicted under pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Disposable: forced sweeps remove everything under the prefix.
    Low,
    Medium,
    /// Kept until genuinely expired, even under pressure.
    High,
}

/// Per-module retention rule. Exactly one policy per module name;
/// re-adding a name replaces the previous rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetentionPolicy {
    pub module: String,
    pub max_age_days: u32,
    pub priority: Priority,
    /// Keys starting with this prefix belong to the module.
    pub key_prefix: String,
}

impl RetentionPolicy {
    /// The default policy set covering the application's standard key
    /// prefixes.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        let policy = |module: &str, max_age_days, priority, key_prefix: &str| Self {
            module: module.into(),
            max_age_days,
            priority,
            key_prefix: key_prefix.into(),
        };
        vec![
            policy("cache", 7, Priority::Low, "cache_"),
            policy("sync", 30, Priority::High, "sync_"),
            policy("ai", 14, Priority::Medium, "ai_"),
            policy("audit", 90, Priority::High, "audit_"),
            policy("temp", 1, Priority::Low, "temp_"),
            policy("draft", 30, Priority::Medium, "draft_"),
            policy("analytics", 60, Priority::Low, "analytics_"),
        ]
    }
}

/// What one sweep removed for one module. Immutable once recorded;
/// appended to a history capped at 50 entries.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupResult {
    pub module: String,
    pub items_removed: u32,
    pub bytes_freed: u64,
    pub timestamp: Timestamp,
}

/// Local-storage usage, measured as stored-string UTF-16 code units × 2.
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    /// Total bytes across every stored entry.
    pub used: u64,
    /// Best-effort quota; defaults to 5 MiB when the host supplies none.
    pub quota: u64,
    /// Usage grouped by policy module (prefix match).
    pub by_module: std::collections::BTreeMap<String, u64>,
}

/// How urgently a cleanup is advised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

/// Advisory verdict from [`RetentionManager::suggest_cleanup`]. Never
/// triggers a sweep by itself.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupSuggestion {
    pub should_clean: bool,
    pub reason: String,
    pub urgency: Urgency,
}
