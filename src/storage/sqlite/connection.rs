use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::errors::{PlanetError, PlanetResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS id_index (
    entry_key TEXT PRIMARY KEY,
    feed_id TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_id_index_feed_id ON id_index(feed_id);
"#;

#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> PlanetResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> PlanetResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>, PlanetError> {
        self.conn
            .lock()
            .map_err(|_| PlanetError::Database(rusqlite::Error::InvalidQuery))
    }
}
