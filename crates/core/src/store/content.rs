//! Content cache: opaque key -> body storage for cached responses.
//!
//! Entries are keyed by normalized URL, the same keys the `cache-index`
//! record collection holds. The two stores are physically separate but
//! maintained as one logical unit by the strategy and eviction layers.

use super::connection::StoreDb;
use crate::Error;
use tokio_rusqlite::{params, rusqlite};

/// A cached response body with the metadata needed to replay it.
///
/// `status` is `None` for opaque (no-cors) responses whose status code is
/// unknown to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub status: Option<u16>,
    pub stored_at: String,
}

impl ContentEntry {
    /// Build an entry stamped with the current time.
    pub fn new(key: impl Into<String>, body: Vec<u8>, content_type: Option<String>, status: Option<u16>) -> Self {
        Self {
            key: key.into(),
            body,
            content_type,
            status,
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Handle to the content table of the shared database.
#[derive(Clone, Debug)]
pub struct ContentCache {
    db: StoreDb,
}

impl ContentCache {
    pub fn new(db: StoreDb) -> Self {
        Self { db }
    }

    /// Insert or replace an entry.
    ///
    /// The upsert is a single atomic statement: concurrent readers see
    /// either the previous entry or the new one, never a torn write.
    pub async fn put(&self, entry: ContentEntry) -> Result<(), Error> {
        self.db
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO content (key, body, content_type, status, stored_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(key) DO UPDATE SET
                        body = excluded.body,
                        content_type = excluded.content_type,
                        status = excluded.status,
                        stored_at = excluded.stored_at",
                    params![
                        entry.key,
                        entry.body,
                        entry.content_type,
                        entry.status.map(|s| s as i64),
                        entry.stored_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::StoreUnavailable)
    }

    /// Look up an entry by key. A miss is `Ok(None)`, not an error.
    pub async fn get(&self, key: &str) -> Result<Option<ContentEntry>, Error> {
        let key = key.to_string();
        self.db
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT key, body, content_type, status, stored_at
                     FROM content WHERE key = ?1",
                )?;
                let result = stmt.query_row(params![key], |row| {
                    Ok(ContentEntry {
                        key: row.get(0)?,
                        body: row.get(1)?,
                        content_type: row.get(2)?,
                        status: row.get::<_, Option<i64>>(3)?.map(|s| s as u16),
                        stored_at: row.get(4)?,
                    })
                });
                match result {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(Error::StoreUnavailable)
    }

    /// Delete an entry if present.
    pub async fn delete(&self, key: &str) -> Result<(), Error> {
        let key = key.to_string();
        self.db
            .conn
            .call(move |conn| {
                conn.execute("DELETE FROM content WHERE key = ?1", params![key])?;
                Ok(())
            })
            .await
            .map_err(Error::StoreUnavailable)
    }

    /// All cached keys, for diagnostics.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        self.db
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT key FROM content ORDER BY key")?;
                let keys = stmt.query_map([], |row| row.get(0))?.collect::<Result<_, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::StoreUnavailable)
    }
}
