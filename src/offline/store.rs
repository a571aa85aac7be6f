//! SQLite-backed offline store.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use jiff::Timestamp;
use rusqlite::Connection;

use crate::clock::Clock;

use super::{
    ActionPayload, CachedEntity, EntityDraft, EntityKind, OfflineStatus, PendingAction, Result,
};

/// Bump on any schema change, with a migration arm below.
const SCHEMA_VERSION: i32 = 1;

const LAST_SYNC_KEY: &str = "last_sync";

/// Durable cache of domain entities plus a queue of actions awaiting
/// network replay.
pub struct OfflineStore {
    conn: Connection,
    clock: Arc<dyn Clock>,
    online: AtomicBool,
}

impl OfflineStore {
    /// Opens (or creates) the store at the given path and brings the
    /// schema up to date. Safe to call repeatedly on the same file: the
    /// migration is guarded by the recorded schema version.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_connection(Connection::open(path)?, clock)
    }

    /// Opens an in-memory store; contents vanish on drop.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, clock)
    }

    fn with_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn,
            clock,
            online: AtomicBool::new(true),
        })
    }

    // ── Entities ──

    /// Bulk-upserts entities of one family, stamping `cached_at = now`
    /// on every record (overwriting any prior stamp).
    pub fn cache_entities(&self, kind: EntityKind, drafts: &[EntityDraft]) -> Result<()> {
        let now = self.clock.now().to_string();
        let tx = self.conn.unchecked_transaction()?;
        {
            let sql = format!(
                "INSERT OR REPLACE INTO {} (id, payload, cached_at) VALUES (?1, ?2, ?3)",
                kind.table()
            );
            let mut stmt = tx.prepare(&sql)?;
            for draft in drafts {
                let payload = serde_json::to_string(&draft.payload)?;
                stmt.execute(rusqlite::params![draft.id, payload, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Reads back every cached entity of one family, ordered by id.
    pub fn entities(&self, kind: EntityKind) -> Result<Vec<CachedEntity>> {
        let sql = format!(
            "SELECT id, payload, cached_at FROM {} ORDER BY id",
            kind.table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut entities = Vec::new();
        for row in rows {
            let (id, payload, cached_at) = row?;
            entities.push(CachedEntity {
                id,
                payload: serde_json::from_str(&payload)?,
                cached_at: cached_at.parse::<Timestamp>()?,
            });
        }
        Ok(entities)
    }

    // ── Pending actions ──

    /// Queues a mutation for later replay and returns its id. The record
    /// starts with `synced = false` and `timestamp = now`; nothing here
    /// touches the network.
    pub fn add_pending_action(&self, action: &ActionPayload) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO pending_actions (kind, params, timestamp, synced)
             VALUES (?1, ?2, ?3, 0)",
            rusqlite::params![
                action.kind,
                serde_json::to_string(&action.params)?,
                self.clock.now().to_string(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Every action still awaiting replay, in insertion (auto-increment)
    /// order. Served by the `synced` index, not a full scan.
    pub fn pending_actions(&self) -> Result<Vec<PendingAction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, params, timestamp, synced
             FROM pending_actions INDEXED BY idx_pending_synced
             WHERE synced = 0 ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, bool>(4)?,
            ))
        })?;
        let mut actions = Vec::new();
        for row in rows {
            let (id, kind, params, timestamp, synced) = row?;
            actions.push(PendingAction {
                id,
                action: ActionPayload {
                    kind,
                    params: serde_json::from_str(&params)?,
                },
                timestamp: timestamp.parse::<Timestamp>()?,
                synced,
            });
        }
        Ok(actions)
    }

    /// Marks one action as replayed. Idempotent: an unknown id is a
    /// no-op, and `synced` never transitions back to false.
    pub fn mark_action_synced(&self, id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE pending_actions SET synced = 1 WHERE id = ?1",
            rusqlite::params![id],
        )?;
        Ok(())
    }

    /// Empties the pending-action queue entirely, synced or not. Used
    /// after a full successful resync or an explicit reset.
    pub fn clear_pending_actions(&self) -> Result<()> {
        self.conn.execute("DELETE FROM pending_actions", [])?;
        Ok(())
    }

    // ── Status ──

    /// Records the host's connectivity signal; `offline_status` negates
    /// it.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Composite connectivity snapshot.
    pub fn offline_status(&self) -> Result<OfflineStatus> {
        let pending: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pending_actions WHERE synced = 0",
            [],
            |row| row.get(0),
        )?;

        let mut cached_data_size: u64 = 0;
        for kind in EntityKind::ALL {
            let sql = format!(
                "SELECT COALESCE(SUM(LENGTH(payload)), 0) FROM {}",
                kind.table()
            );
            let bytes: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
            cached_data_size += u64::try_from(bytes).unwrap_or(0);
        }

        let last_sync = match self.config_value(LAST_SYNC_KEY)? {
            Some(text) => Some(text.parse::<Timestamp>()?),
            None => None,
        };

        Ok(OfflineStatus {
            is_offline: !self.online.load(Ordering::SeqCst),
            last_sync,
            pending_actions: u64::try_from(pending).unwrap_or(0),
            cached_data_size,
        })
    }

    /// Stamps the current time as the last completed sync.
    pub fn update_last_sync(&self) -> Result<()> {
        self.set_config(LAST_SYNC_KEY, &self.clock.now().to_string())
    }

    /// Wipes every store: entities, pending actions, and config. Used
    /// for full cache invalidation, e.g. on logout.
    pub fn clear_all(&self) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for kind in EntityKind::ALL {
            tx.execute(&format!("DELETE FROM {}", kind.table()), [])?;
        }
        tx.execute("DELETE FROM pending_actions", [])?;
        tx.execute("DELETE FROM config", [])?;
        tx.commit()?;
        Ok(())
    }

    // ── Config ──

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    fn config_value(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM config WHERE key = ?1")?;
        let mut rows = stmt.query(rusqlite::params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version < 1 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS routes (
                 id TEXT PRIMARY KEY,
                 payload TEXT NOT NULL,
                 cached_at TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS crew (
                 id TEXT PRIMARY KEY,
                 payload TEXT NOT NULL,
                 cached_at TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS vessels (
                 id TEXT PRIMARY KEY,
                 payload TEXT NOT NULL,
                 cached_at TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS pending_actions (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 kind TEXT NOT NULL,
                 params TEXT NOT NULL,
                 timestamp TEXT NOT NULL,
                 synced INTEGER NOT NULL DEFAULT 0
             );
             CREATE INDEX IF NOT EXISTS idx_pending_synced ON pending_actions (synced);
             CREATE INDEX IF NOT EXISTS idx_pending_timestamp ON pending_actions (timestamp);
             CREATE TABLE IF NOT EXISTS config (
                 key TEXT PRIMARY KEY,
                 value TEXT NOT NULL
             );",
        )?;
    }
    if version != SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tempfile::TempDir;

    use crate::clock::ManualClock;

    fn store() -> (Arc<ManualClock>, OfflineStore) {
        let clock = Arc::new(ManualClock::epoch());
        let store = OfflineStore::in_memory(clock.clone()).unwrap();
        (clock, store)
    }

    fn vessel(id: &str, name: &str) -> EntityDraft {
        EntityDraft {
            id: id.into(),
            payload: json!({ "name": name, "flag": "NO" }),
        }
    }

    #[test]
    fn cache_and_read_entities_round_trip() {
        let (_clock, store) = store();

        store
            .cache_entities(
                EntityKind::Vessels,
                &[vessel("v1", "MV Nordkapp"), vessel("v2", "MV Stavanger")],
            )
            .unwrap();

        let vessels = store.entities(EntityKind::Vessels).unwrap();
        assert_eq!(vessels.len(), 2);
        assert_eq!(vessels[0].id, "v1");
        assert_eq!(vessels[0].payload["name"], "MV Nordkapp");
        assert_eq!(vessels[0].cached_at, Timestamp::UNIX_EPOCH);

        // Families are independent.
        assert!(store.entities(EntityKind::Crew).unwrap().is_empty());
    }

    #[test]
    fn upsert_overwrites_payload_and_cached_at() {
        let (clock, store) = store();
        store
            .cache_entities(EntityKind::Routes, &[vessel("r1", "old")])
            .unwrap();

        clock.advance_ms(60_000);
        store
            .cache_entities(EntityKind::Routes, &[vessel("r1", "new")])
            .unwrap();

        let routes = store.entities(EntityKind::Routes).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].payload["name"], "new");
        assert_eq!(routes[0].cached_at.as_millisecond(), 60_000);
    }

    #[test]
    fn pending_action_lifecycle() {
        let (_clock, store) = store();

        let id = store
            .add_pending_action(&ActionPayload {
                kind: "create_vessel".into(),
                params: json!({ "name": "MV Test" }),
            })
            .unwrap();

        let pending = store.pending_actions().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].action.kind, "create_vessel");
        assert!(!pending[0].synced);

        store.mark_action_synced(id).unwrap();
        assert!(store.pending_actions().unwrap().is_empty());
    }

    #[test]
    fn pending_actions_keep_insertion_order() {
        let (_clock, store) = store();
        for kind in ["first", "second", "third"] {
            store
                .add_pending_action(&ActionPayload {
                    kind: kind.into(),
                    params: json!({}),
                })
                .unwrap();
        }

        let kinds: Vec<_> = store
            .pending_actions()
            .unwrap()
            .into_iter()
            .map(|a| a.action.kind)
            .collect();
        assert_eq!(kinds, ["first", "second", "third"]);
    }

    #[test]
    fn mark_synced_on_missing_id_is_a_noop() {
        let (_clock, store) = store();
        store
            .add_pending_action(&ActionPayload {
                kind: "update_crew".into(),
                params: json!({}),
            })
            .unwrap();

        store.mark_action_synced(9999).unwrap();
        assert_eq!(store.pending_actions().unwrap().len(), 1);
    }

    #[test]
    fn clear_pending_actions_empties_the_queue() {
        let (_clock, store) = store();
        store
            .add_pending_action(&ActionPayload {
                kind: "create_vessel".into(),
                params: json!({}),
            })
            .unwrap();

        store.clear_pending_actions().unwrap();
        assert!(store.pending_actions().unwrap().is_empty());
        assert_eq!(store.offline_status().unwrap().pending_actions, 0);
    }

    #[test]
    fn offline_status_composes_signals() {
        let (clock, store) = store();

        store
            .cache_entities(EntityKind::Crew, &[vessel("c1", "Bosun")])
            .unwrap();
        store
            .add_pending_action(&ActionPayload {
                kind: "update_crew".into(),
                params: json!({ "id": "c1" }),
            })
            .unwrap();
        clock.advance_ms(1_000);
        store.update_last_sync().unwrap();
        store.set_online(false);

        let status = store.offline_status().unwrap();
        assert!(status.is_offline);
        assert_eq!(status.pending_actions, 1);
        assert!(status.cached_data_size > 0);
        assert_eq!(status.last_sync.unwrap().as_millisecond(), 1_000);
    }

    #[test]
    fn clear_all_wipes_every_store() {
        let (_clock, store) = store();
        store
            .cache_entities(EntityKind::Vessels, &[vessel("v1", "MV Test")])
            .unwrap();
        store
            .add_pending_action(&ActionPayload {
                kind: "create_vessel".into(),
                params: json!({}),
            })
            .unwrap();
        store.update_last_sync().unwrap();

        store.clear_all().unwrap();

        assert!(store.entities(EntityKind::Vessels).unwrap().is_empty());
        let status = store.offline_status().unwrap();
        assert_eq!(status.pending_actions, 0);
        assert_eq!(status.cached_data_size, 0);
        assert!(status.last_sync.is_none());
    }

    #[test]
    fn reopening_the_same_file_is_idempotent_and_keeps_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("offline.sqlite");
        let clock = Arc::new(ManualClock::epoch());

        {
            let store = OfflineStore::open(&path, clock.clone()).unwrap();
            store
                .cache_entities(EntityKind::Routes, &[vessel("r1", "Coastal Express")])
                .unwrap();
        }

        // Second open re-runs the guarded migration and finds the data.
        let store = OfflineStore::open(&path, clock).unwrap();
        let routes = store.entities(EntityKind::Routes).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].payload["name"], "Coastal Express");
    }
}
