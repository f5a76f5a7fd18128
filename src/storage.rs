use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

const KEY_TOKEN: &str = "token";
const KEY_USER: &str = "user";

/// Small persisted key-value store. The client keeps exactly two entries in
/// it: the opaque auth token and the serialized user identity.
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

impl Store {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("storage: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("storage: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("storage: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", &"WAL")
            .context("storage: set WAL")?;
        conn.pragma_update(None, "busy_timeout", &5000)
            .context("storage: set busy timeout")?;
        migrate(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("storage: connection still in use"))?
            .into_inner();
        conn.close()
            .map_err(|(_, err)| err)
            .context("storage: close connection")
    }

    pub fn set_entry(&self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            bail!("storage: entry key required");
        }
        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO kv_store (key, value, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET
  value = excluded.value,
  updated_at = excluded.updated_at
"#,
            params![key, value, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    pub fn get_entry(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .context("storage: query entry")
    }

    pub fn delete_entry(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn save_session(&self, token: &str, user_json: &str) -> Result<()> {
        if token.is_empty() {
            bail!("storage: session token required");
        }
        self.set_entry(KEY_TOKEN, token)?;
        self.set_entry(KEY_USER, user_json)
    }

    /// Returns the persisted `(token, user_json)` pair, or `None` when the
    /// client is anonymous. Half a session counts as no session.
    pub fn load_session(&self) -> Result<Option<(String, String)>> {
        let token = self.get_entry(KEY_TOKEN)?;
        let user = self.get_entry(KEY_USER)?;
        match (token, user) {
            (Some(token), Some(user)) if !token.is_empty() => Ok(Some((token, user))),
            _ => Ok(None),
        }
    }

    pub fn clear_session(&self) -> Result<()> {
        self.delete_entry(KEY_TOKEN)?;
        self.delete_entry(KEY_USER)
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for (idx, sql) in migrations().iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, Utc::now().timestamp()],
        )?;
    }
    Ok(())
}

fn migrations() -> Vec<&'static str> {
    vec![
        r#"
CREATE TABLE IF NOT EXISTS kv_store (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);
"#,
    ]
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tarmeez-tui").join("state.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        let store = Store::open(Options {
            path: Some(path.clone()),
        })
        .unwrap();
        assert!(path.exists());
        store.close().unwrap();
    }

    #[test]
    fn session_round_trips_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");

        let store = Store::open(Options {
            path: Some(path.clone()),
        })
        .unwrap();
        store
            .save_session("abc123", r#"{"id":1,"username":"omar"}"#)
            .unwrap();
        store.close().unwrap();

        let store = Store::open(Options { path: Some(path) }).unwrap();
        let (token, user) = store.load_session().unwrap().expect("session persisted");
        assert_eq!(token, "abc123");
        assert!(user.contains("omar"));

        store.clear_session().unwrap();
        assert!(store.load_session().unwrap().is_none());
        store.close().unwrap();
    }
}
