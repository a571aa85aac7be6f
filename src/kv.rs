//! Flat durable key-value namespace.
//!
//! The retention sweep operates on a browser-localStorage-shaped surface:
//! string keys, string (usually JSON) values, no structure beyond key
//! prefixes. Backed by a single SQLite table so the data survives
//! restarts; kept separate from the offline entity store because the two
//! families are independent and never need a cross-store transaction.

use std::path::Path;

use rusqlite::Connection;

/// Errors from the key-value store.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = core::result::Result<T, KvError>;

/// Durable string key → string value store.
pub struct KvStore {
    conn: Connection,
}

impl KvStore {
    /// Opens (or creates) the store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory store; contents vanish on drop.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )?;
        Ok(Self { conn })
    }

    /// Inserts or replaces the value under `key`.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    /// Returns the value under `key`, if present.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let mut rows = stmt.query(rusqlite::params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Removes `key`. Idempotent: a missing key is a no-op.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key])?;
        Ok(())
    }

    /// All entries, sorted by key.
    pub fn entries(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM kv ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<core::result::Result<_, _>>().map_err(Into::into)
    }

    /// Entries whose key starts with `prefix`, sorted by key.
    ///
    /// Prefix matching happens in Rust: policy prefixes like `cache_`
    /// contain `_`, which is a wildcard to SQL `LIKE`.
    pub fn entries_with_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .collect())
    }

    /// Number of stored entries.
    pub fn len(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// True when the store holds no entries.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn set_get_remove_round_trip() {
        let kv = KvStore::in_memory().unwrap();

        kv.set("cache_123", r#"{"timestamp":0}"#).unwrap();
        assert_eq!(kv.get("cache_123").unwrap().unwrap(), r#"{"timestamp":0}"#);

        kv.remove("cache_123").unwrap();
        assert!(kv.get("cache_123").unwrap().is_none());

        // Removing again is a no-op.
        kv.remove("cache_123").unwrap();
    }

    #[test]
    fn set_replaces_existing_value() {
        let kv = KvStore::in_memory().unwrap();
        kv.set("draft_1", "old").unwrap();
        kv.set("draft_1", "new").unwrap();
        assert_eq!(kv.get("draft_1").unwrap().unwrap(), "new");
        assert_eq!(kv.len().unwrap(), 1);
    }

    #[test]
    fn prefix_filter_does_not_treat_underscore_as_wildcard() {
        let kv = KvStore::in_memory().unwrap();
        kv.set("cache_1", "a").unwrap();
        kv.set("cacheX1", "b").unwrap();
        kv.set("sync_1", "c").unwrap();

        let cached = kv.entries_with_prefix("cache_").unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].0, "cache_1");
    }

    #[test]
    fn persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("retention.sqlite");

        {
            let kv = KvStore::open(&path).unwrap();
            kv.set("audit_7", "kept").unwrap();
        }

        let kv = KvStore::open(&path).unwrap();
        assert_eq!(kv.get("audit_7").unwrap().unwrap(), "kept");
    }
}
