//! Action token persistence.
//!
//! `claim` is the only way a token becomes used, and it must be atomic:
//! of any number of concurrent claims on one token, exactly one returns
//! `true`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rpt_core::{ReportError, ReportResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

use crate::action::ActionToken;

pub trait ActionStore: Send + Sync {
    fn insert(&self, token: &ActionToken) -> ReportResult<()>;

    fn get(&self, guid: &str) -> ReportResult<Option<ActionToken>>;

    /// Marks the token used. `false` when it is unknown or already used.
    fn claim(&self, guid: &str) -> ReportResult<bool>;
}

// ============================================================================
// Memory
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryActionStore {
    tokens: Mutex<HashMap<String, ActionToken>>,
}

impl MemoryActionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ActionStore for MemoryActionStore {
    fn insert(&self, token: &ActionToken) -> ReportResult<()> {
        self.tokens.lock().insert(token.guid.clone(), token.clone());
        Ok(())
    }

    fn get(&self, guid: &str) -> ReportResult<Option<ActionToken>> {
        Ok(self.tokens.lock().get(guid).cloned())
    }

    fn claim(&self, guid: &str) -> ReportResult<bool> {
        let mut tokens = self.tokens.lock();
        match tokens.get_mut(guid) {
            Some(token) if !token.used => {
                token.used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ============================================================================
// SQLite
// ============================================================================

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS actions (
    guid TEXT PRIMARY KEY,
    workflow TEXT NOT NULL,
    tag TEXT,
    expiry TEXT NOT NULL,
    used INTEGER NOT NULL DEFAULT 0,
    settings TEXT NOT NULL,
    created TEXT NOT NULL
)";

fn store_error(e: impl std::fmt::Display) -> ReportError {
    ReportError::Datasource(format!("Action store - {}", e))
}

fn parse_time(text: &str) -> ReportResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(store_error)
}

/// Tokens in an `actions` table
pub struct SqliteActionStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteActionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteActionStore").finish_non_exhaustive()
    }
}

impl SqliteActionStore {
    /// Opens (or creates) the database and its `actions` table
    pub fn open(path: impl AsRef<Path>) -> ReportResult<Self> {
        let conn = Connection::open(path.as_ref()).map_err(store_error)?;
        tracing::debug!(path = %path.as_ref().display(), "action store opened");
        Self::with_connection(conn)
    }

    pub fn memory() -> ReportResult<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(store_error)?)
    }

    fn with_connection(conn: Connection) -> ReportResult<Self> {
        conn.execute_batch(SCHEMA).map_err(store_error)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

impl ActionStore for SqliteActionStore {
    fn insert(&self, token: &ActionToken) -> ReportResult<()> {
        let settings = serde_json::to_string(&token.settings).map_err(store_error)?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO actions (guid, workflow, tag, expiry, used, settings, created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    token.guid,
                    token.workflow,
                    token.tag,
                    token.expiry.to_rfc3339(),
                    token.used,
                    settings,
                    token.created.to_rfc3339(),
                ],
            )
            .map_err(store_error)?;
        Ok(())
    }

    fn get(&self, guid: &str) -> ReportResult<Option<ActionToken>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT guid, workflow, tag, expiry, used, settings, created FROM actions WHERE guid = ?1",
                params![guid],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()
            .map_err(store_error)?;

        let Some((guid, workflow, tag, expiry, used, settings, created)) = row else {
            return Ok(None);
        };
        Ok(Some(ActionToken {
            guid,
            workflow,
            tag,
            expiry: parse_time(&expiry)?,
            used,
            settings: serde_json::from_str(&settings).map_err(store_error)?,
            created: parse_time(&created)?,
        }))
    }

    fn claim(&self, guid: &str) -> ReportResult<bool> {
        let changed = self
            .conn
            .lock()
            .execute("UPDATE actions SET used = 1 WHERE guid = ?1 AND used = 0", params![guid])
            .map_err(store_error)?;
        Ok(changed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Map, Value};

    fn token() -> ActionToken {
        let mut settings = Map::new();
        settings.insert("site".into(), json!(7));
        ActionToken::new("approve", Some("site-7".into()), Utc::now(), settings)
    }

    fn exercise(store: &dyn ActionStore) {
        let token = token();
        store.insert(&token).unwrap();
        assert!(store.get("missing").unwrap().is_none());
        assert!(!store.claim("missing").unwrap());

        let loaded = store.get(&token.guid).unwrap().unwrap();
        assert_eq!(loaded.workflow, "approve");
        assert_eq!(loaded.settings.get("site"), Some(&Value::from(7)));
        assert!(!loaded.used);

        assert!(store.claim(&token.guid).unwrap());
        assert!(!store.claim(&token.guid).unwrap());
        assert!(store.get(&token.guid).unwrap().unwrap().used);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryActionStore::new();
        exercise(&store);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sqlite_store() {
        exercise(&SqliteActionStore::memory().unwrap());
    }

    #[test]
    fn test_sqlite_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actions.db");
        let token = token();
        {
            let store = SqliteActionStore::open(&path).unwrap();
            store.insert(&token).unwrap();
        }
        let store = SqliteActionStore::open(&path).unwrap();
        let loaded = store.get(&token.guid).unwrap().unwrap();
        assert_eq!(loaded.tag.as_deref(), Some("site-7"));
        assert_eq!(loaded.expiry.timestamp(), token.expiry.timestamp());
    }
}
