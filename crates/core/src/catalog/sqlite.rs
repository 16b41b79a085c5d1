//! SQLite-backed torrent catalog implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};

use super::{CatalogError, TorrentCatalog, TorrentRecord};
use crate::torrent::{InfoHash, TorrentSpec};

/// SQLite-backed torrent catalog.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Create a new SQLite catalog, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open(path).map_err(|e| CatalogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite catalog (useful for testing).
    pub fn in_memory() -> Result<Self, CatalogError> {
        let conn =
            Connection::open_in_memory().map_err(|e| CatalogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CatalogError> {
        conn.execute_batch(
            r#"
            -- One row per known torrent, keyed by lowercase hex info hash
            CREATE TABLE IF NOT EXISTS torrents (
                hash TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                poster TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL DEFAULT '',
                size_bytes INTEGER NOT NULL DEFAULT 0,
                file_count INTEGER NOT NULL DEFAULT 0,
                timestamp INTEGER NOT NULL,
                data TEXT NOT NULL DEFAULT '',
                spec TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_torrents_order ON torrents(timestamp DESC, title DESC);
            "#,
        )
        .map_err(|e| CatalogError::Database(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CatalogError> {
        self.conn
            .lock()
            .map_err(|_| CatalogError::Database("catalog connection poisoned".to_string()))
    }

    /// Raw column values for one row, decoded outside the rusqlite closure so
    /// corrupt JSON surfaces as a catalog error instead of a driver error.
    fn read_row(row: &rusqlite::Row) -> rusqlite::Result<RawRow> {
        Ok(RawRow {
            hash: row.get(0)?,
            title: row.get(1)?,
            poster: row.get(2)?,
            category: row.get(3)?,
            size_bytes: row.get::<_, i64>(4)?,
            file_count: row.get::<_, i64>(5)?,
            timestamp: row.get(6)?,
            data: row.get(7)?,
            spec: row.get(8)?,
        })
    }
}

struct RawRow {
    hash: String,
    title: String,
    poster: String,
    category: String,
    size_bytes: i64,
    file_count: i64,
    timestamp: i64,
    data: String,
    spec: String,
}

impl RawRow {
    fn into_record(self) -> Result<TorrentRecord, CatalogError> {
        let hash = InfoHash::parse(&self.hash)
            .map_err(|e| CatalogError::Corrupt(self.hash.clone(), e.to_string()))?;
        let spec: TorrentSpec = serde_json::from_str(&self.spec)
            .map_err(|e| CatalogError::Corrupt(self.hash.clone(), e.to_string()))?;

        Ok(TorrentRecord {
            hash,
            title: self.title,
            poster: self.poster,
            category: self.category,
            size_bytes: self.size_bytes.max(0) as u64,
            file_count: self.file_count.max(0) as u32,
            timestamp: self.timestamp,
            data: self.data,
            spec,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT hash, title, poster, category, size_bytes, file_count, timestamp, data, spec FROM torrents";

impl TorrentCatalog for SqliteCatalog {
    fn get(&self, hash: &InfoHash) -> Result<TorrentRecord, CatalogError> {
        let conn = self.conn()?;
        let key = hash.to_hex();

        let raw = conn
            .query_row(
                &format!("{} WHERE hash = ?", SELECT_COLUMNS),
                params![&key],
                Self::read_row,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => CatalogError::NotFound(key.clone()),
                _ => CatalogError::Database(e.to_string()),
            })?;

        raw.into_record()
    }

    fn put(&self, record: &TorrentRecord) -> Result<(), CatalogError> {
        let conn = self.conn()?;
        let spec = serde_json::to_string(&record.spec)
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO torrents (hash, title, poster, category, size_bytes, file_count, timestamp, data, spec)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(hash) DO UPDATE SET
                title = excluded.title,
                poster = excluded.poster,
                category = excluded.category,
                size_bytes = excluded.size_bytes,
                file_count = excluded.file_count,
                timestamp = excluded.timestamp,
                data = excluded.data,
                spec = excluded.spec",
            params![
                record.hash.to_hex(),
                &record.title,
                &record.poster,
                &record.category,
                record.size_bytes as i64,
                record.file_count as i64,
                record.timestamp,
                &record.data,
                &spec,
            ],
        )
        .map_err(|e| CatalogError::Database(e.to_string()))?;

        Ok(())
    }

    fn delete(&self, hash: &InfoHash) -> Result<bool, CatalogError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute("DELETE FROM torrents WHERE hash = ?", params![hash.to_hex()])
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        Ok(deleted > 0)
    }

    fn list(&self) -> Result<Vec<TorrentRecord>, CatalogError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "{} ORDER BY timestamp DESC, title DESC",
                SELECT_COLUMNS
            ))
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], Self::read_row)
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| CatalogError::Database(e.to_string()))?;
            records.push(raw.into_record()?);
        }
        Ok(records)
    }

    fn exists(&self, hash: &InfoHash) -> Result<bool, CatalogError> {
        let conn = self.conn()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM torrents WHERE hash = ?",
                params![hash.to_hex()],
                |_| Ok(true),
            )
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                _ => Err(CatalogError::Database(e.to_string())),
            })?;
        Ok(exists)
    }
}
