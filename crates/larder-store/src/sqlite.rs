//! SQLite-based store implementation

use larder_util::{ChannelKey, channel_filename};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::{Store, StoreCapabilities, StoreError, StoreFactory, StoreResult};

/// SQLite-based key-value store
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
    label: String,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(Some(conn)),
            label: path.display().to_string(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(Some(conn)),
            label: ":memory:".into(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Whether writes are currently committed statement by statement
    pub fn is_autocommit(&self) -> StoreResult<bool> {
        self.with_conn(|conn| Ok(conn.is_autocommit()))
    }

    pub fn is_closed(&self) -> bool {
        self.conn.lock().map(|c| c.is_none()).unwrap_or(true)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Option<Connection>>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let guard = self.lock()?;
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(StoreError::Closed),
        }
    }

    fn init_schema(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS kv (
                    key TEXT PRIMARY KEY,
                    value BLOB NOT NULL
                );
                "#,
            )?;
            Ok(())
        })?;

        debug!(store = %self.label, "Store schema initialized");
        Ok(())
    }
}

impl Store for SqliteStore {
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::FLUSH | StoreCapabilities::CLOSE
    }

    fn set_autocommit(&self, enabled: bool) -> StoreResult<()> {
        self.with_conn(|conn| {
            match (enabled, conn.is_autocommit()) {
                (true, false) => conn.execute_batch("COMMIT")?,
                (false, true) => conn.execute_batch("BEGIN")?,
                _ => {}
            }
            Ok(())
        })
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row("SELECT value FROM kv WHERE key = ?", [key], |row| {
                    row.get::<_, Vec<u8>>(0)
                })
                .optional()?;
            Ok(value)
        })
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO kv (key, value)
                VALUES (?, ?)
                ON CONFLICT(key)
                DO UPDATE SET value = excluded.value
                "#,
                params![key, value],
            )?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM kv WHERE key = ?", [key])?;
            Ok(changed > 0)
        })
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut keys = Vec::new();
            for key in rows {
                keys.push(key?);
            }
            Ok(keys)
        })
    }

    fn flush(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            // Outside a transaction every statement is already committed
            if !conn.is_autocommit() {
                conn.execute_batch("COMMIT; BEGIN")?;
                debug!(store = %self.label, "Store committed");
            }
            Ok(())
        })
    }

    fn close(&self) -> StoreResult<()> {
        let mut guard = self.lock()?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| StoreError::from(e))?;
            debug!(store = %self.label, "Store closed");
        }
        Ok(())
    }
}

/// Decides whether a channel keeps its databases in its own directory
pub type Placement = Arc<dyn Fn(&ChannelKey) -> bool + Send + Sync>;

/// Opens one SQLite database per channel under the data directory.
///
/// Channels with channel-specific storage get `<data_dir>/<channel>/<file>`;
/// the rest share `<data_dir>/<file>`.
pub struct SqliteFactory {
    data_dir: PathBuf,
    file_name: String,
    placement: Placement,
}

impl SqliteFactory {
    /// `name` gets a `.db` suffix unless it already has one
    pub fn new(data_dir: impl Into<PathBuf>, name: &str) -> Self {
        let file_name = if name.ends_with(".db") {
            name.to_string()
        } else {
            format!("{}.db", name)
        };

        Self {
            data_dir: data_dir.into(),
            file_name,
            placement: Arc::new(|_| true),
        }
    }

    /// Same placement for every channel
    pub fn with_channel_specific(mut self, enabled: bool) -> Self {
        self.placement = Arc::new(move |_| enabled);
        self
    }

    /// Per-channel placement, usually `Settings::channel_specific`
    pub fn with_placement(
        mut self,
        placement: impl Fn(&ChannelKey) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.placement = Arc::new(placement);
        self
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Where the database for `channel` lives
    pub fn path_for(&self, channel: &ChannelKey) -> StoreResult<PathBuf> {
        let specific = (self.placement)(channel);
        Ok(channel_filename(
            &self.data_dir,
            channel,
            &self.file_name,
            specific,
        )?)
    }
}

impl StoreFactory for SqliteFactory {
    type Store = SqliteStore;

    fn make_store(&self, key: &ChannelKey) -> StoreResult<SqliteStore> {
        let path = self.path_for(key)?;
        SqliteStore::open(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_util::LarderError;

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(!store.is_closed());
        assert!(store.capabilities().contains(StoreCapabilities::FLUSH));
        assert!(store.capabilities().contains(StoreCapabilities::CLOSE));
    }

    #[test]
    fn test_key_value_roundtrip() {
        let store = SqliteStore::in_memory().unwrap();

        assert!(store.get("seen").unwrap().is_none());

        store.put("seen", b"yesterday").unwrap();
        assert_eq!(store.get("seen").unwrap().as_deref(), Some(&b"yesterday"[..]));

        store.put("seen", b"today").unwrap();
        assert_eq!(store.get("seen").unwrap().as_deref(), Some(&b"today"[..]));

        store.put("alpha", b"1").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["alpha", "seen"]);

        assert!(store.remove("seen").unwrap());
        assert!(!store.remove("seen").unwrap());
    }

    #[test]
    fn test_autocommit_toggle() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_autocommit().unwrap());

        store.set_autocommit(false).unwrap();
        assert!(!store.is_autocommit().unwrap());
        store.put("k", b"v").unwrap();

        // Flush commits but stays in manual mode
        store.flush().unwrap();
        assert!(!store.is_autocommit().unwrap());

        store.set_autocommit(true).unwrap();
        assert!(store.is_autocommit().unwrap());
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"v"[..]));
    }

    #[test]
    fn test_close_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        store.close().unwrap();
        store.close().unwrap();
        assert!(store.is_closed());
        assert!(matches!(store.get("k"), Err(StoreError::Closed)));
    }

    #[test]
    fn test_data_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Seen.db");

        let store = SqliteStore::open(&path).unwrap();
        store.put("bob", b"hello").unwrap();
        store.close().unwrap();

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get("bob").unwrap().as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_factory_placement() {
        let dir = tempfile::tempdir().unwrap();
        let shared = ChannelKey::new("#Shared");
        let factory =
            SqliteFactory::new(dir.path(), "Seen").with_placement(move |c| *c != shared);

        assert_eq!(factory.file_name(), "Seen.db");
        assert_eq!(
            factory.path_for(&ChannelKey::new("#Rust")).unwrap(),
            dir.path().join("#rust").join("Seen.db")
        );
        assert_eq!(
            factory.path_for(&ChannelKey::new("#shared")).unwrap(),
            dir.path().join("Seen.db")
        );

        let store = factory.make_store(&ChannelKey::new("#rust")).unwrap();
        store.put("k", b"v").unwrap();
        assert!(dir.path().join("#rust").join("Seen.db").exists());
    }

    #[test]
    fn test_factory_refuses_paths_outside_data_dir() {
        let root = tempfile::tempdir().unwrap();
        let data_dir = root.path().join("data");
        let factory = SqliteFactory::new(&data_dir, "Seen");

        for name in ["#../../outside", "#a/b", "#..\\outside"] {
            let channel = ChannelKey::new(name);
            assert!(matches!(
                factory.make_store(&channel),
                Err(StoreError::Path(LarderError::NotAChannel(_)))
            ));
        }
        assert!(!root.path().join("outside").exists());
        assert!(!root.path().join("outside").join("Seen.db").exists());
    }
}
