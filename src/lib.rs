//! Client-side resilience for offshore-operations applications.
//!
//! Three independent utilities, wired together by an explicit
//! [`Context`] at startup:
//!
//! - [`breaker`] — per-dependency circuit breakers that stop calling a
//!   failing upstream for a cooldown, then probe recovery.
//! - [`offline`] — a durable local store for domain data (routes, crew,
//!   vessels) and a queue of mutations awaiting network replay.
//! - [`retention`] — a policy-driven sweep that bounds the footprint of
//!   locally persisted data.
//!
//! The crate is an in-process library: no server, no CLI. Time is
//! injected through [`clock::Clock`], so breaker cooldowns and retention
//! ages are testable without real waits, and the open → half-open
//! monitor is an explicit [`Context::tick`] step the host schedules.

pub mod breaker;
pub mod clock;
pub mod config;
pub mod context;
pub mod guard;
pub mod kv;
pub mod offline;
pub mod retention;

pub use breaker::{
    BreakerConfig, BreakerRegistry, BreakerStats, CircuitBreaker, CircuitOpenError, CircuitState,
    ExecuteError,
};
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use context::{Context, ContextError};
pub use guard::{FetchError, protected_fetch, protected_send};
pub use kv::KvStore;
pub use offline::{
    ActionPayload, CachedEntity, EntityDraft, EntityKind, OfflineStatus, OfflineStore,
    PendingAction,
};
pub use retention::{
    CleanupResult, CleanupSuggestion, Priority, RetentionManager, RetentionPolicy, StorageStats,
    Urgency,
};
