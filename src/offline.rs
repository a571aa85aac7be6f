//! Offline persistence for domain data and queued mutations.
//!
//! While the network is down the application keeps reading the routes,
//! crew, and vessels it has already seen, and queues mutating actions for
//! replay once connectivity returns. Everything lives in one SQLite file:
//!
//! ```text
//! routes / crew / vessels   # cached entities, keyed by entity id
//! pending_actions           # auto-increment queue, indexed on synced + timestamp
//! config                    # small string key/value store (last_sync, ...)
//! ```
//!
//! Replaying queued actions against the backend is the application's job;
//! this module only guarantees durable, ordered bookkeeping.

mod store;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

pub use store::OfflineStore;

/// Errors from the offline store. Storage failures are propagated, never
/// swallowed: callers depend on this store for correctness.
#[derive(Debug, thiserror::Error)]
pub enum OfflineError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timestamp error: {0}")]
    Timestamp(#[from] jiff::Error),
}

pub type Result<T> = core::result::Result<T, OfflineError>;

/// The entity families the store caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Routes,
    Crew,
    Vessels,
}

impl EntityKind {
    /// Every family, in schema order.
    pub const ALL: [Self; 3] = [Self::Routes, Self::Crew, Self::Vessels];

    pub(crate) fn table(self) -> &'static str {
        match self {
            Self::Routes => "routes",
            Self::Crew => "crew",
            Self::Vessels => "vessels",
        }
    }
}

/// An entity as supplied by a successful fetch, before the store stamps
/// it. The payload is opaque domain JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDraft {
    pub id: String,
    pub payload: serde_json::Value,
}

/// A cached entity as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntity {
    pub id: String,
    pub payload: serde_json::Value,
    /// When the store last upserted this entity.
    pub cached_at: Timestamp,
}

/// A mutation to replay against the backend: a kind tag plus parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPayload {
    pub kind: String,
    pub params: serde_json::Value,
}

/// A queued mutation. `synced` starts false and moves to true exactly
/// once, never back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: i64,
    pub action: ActionPayload,
    pub timestamp: Timestamp,
    pub synced: bool,
}

/// Composite connectivity snapshot for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct OfflineStatus {
    /// Negation of the host's connectivity signal.
    pub is_offline: bool,
    /// When the last full sync completed, if ever.
    pub last_sync: Option<Timestamp>,
    /// Count of actions still awaiting replay.
    pub pending_actions: u64,
    /// Total bytes of cached entity payloads.
    pub cached_data_size: u64,
}
