use rusqlite::OptionalExtension;

use crate::errors::PlanetResult;
use crate::storage::cache_store::CacheStore;
use crate::storage::sqlite::SqliteStorage;
use crate::storage::traits::IdIndex;

pub struct SqliteIdIndex {
    storage: SqliteStorage,
}

impl SqliteIdIndex {
    pub fn new(storage: SqliteStorage) -> Self {
        Self { storage }
    }

    /// Replace the index contents with what the cache currently holds.
    /// Entries that cannot be read are left out. Returns the record count.
    pub fn rebuild(&self, store: &CacheStore) -> PlanetResult<usize> {
        let mut records = Vec::new();
        for file in store.list_entries()? {
            match store.read_entry_file(&file) {
                Ok(entry) if !entry.source.id.is_empty() => records.push((file.key, entry.source.id)),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(key = %file.key, error = %e, "Skipping unreadable entry during reindex");
                }
            }
        }

        let mut conn = self.storage.connection()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM id_index", [])?;
        {
            let mut stmt =
                tx.prepare("INSERT OR REPLACE INTO id_index (entry_key, feed_id) VALUES (?1, ?2)")?;
            for (key, feed_id) in &records {
                stmt.execute((key, feed_id))?;
            }
        }
        tx.commit()?;

        Ok(records.len())
    }
}

impl IdIndex for SqliteIdIndex {
    fn record(&self, entry_key: &str, feed_id: &str) -> PlanetResult<()> {
        let conn = self.storage.connection()?;
        conn.execute(
            "INSERT OR REPLACE INTO id_index (entry_key, feed_id) VALUES (?1, ?2)",
            (entry_key, feed_id),
        )?;
        Ok(())
    }

    fn lookup(&self, entry_key: &str) -> PlanetResult<Option<String>> {
        let conn = self.storage.connection()?;
        let feed_id = conn
            .query_row(
                "SELECT feed_id FROM id_index WHERE entry_key = ?1",
                [entry_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(feed_id)
    }

    fn forget(&self, entry_key: &str) -> PlanetResult<()> {
        let conn = self.storage.connection()?;
        conn.execute("DELETE FROM id_index WHERE entry_key = ?1", [entry_key])?;
        Ok(())
    }

    fn len(&self) -> PlanetResult<usize> {
        let conn = self.storage.connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM id_index", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
