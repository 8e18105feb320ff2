//! Durable record store: named `(key, timestamp)` collections.
//!
//! A record is a durability-log entry distinct from cached content. The
//! engine keeps one collection (`cache-index`) as eviction metadata for the
//! content cache and another (`analytics-log`) as a write-ahead queue of
//! pending network operations.
//!
//! Writing an existing key overwrites its timestamp; a collection never
//! holds two records with the same key.

use std::collections::BTreeMap;
use std::time::Duration;

use super::connection::StoreDb;
use crate::Error;
use tokio_rusqlite::params;

/// Handle to one named record collection.
///
/// Collections are created lazily on first write and persist across
/// restarts. Cloning shares the underlying connection.
#[derive(Clone, Debug)]
pub struct RecordStore {
    db: StoreDb,
    collection: String,
}

impl RecordStore {
    /// Attach to the named collection inside the shared database.
    pub fn new(db: StoreDb, collection: impl Into<String>) -> Self {
        Self { db, collection: collection.into() }
    }

    /// The collection name this store operates on.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Upsert a record with the current wall-clock timestamp.
    pub async fn put(&self, key: &str) -> Result<(), Error> {
        self.put_at(key, chrono::Utc::now().timestamp_millis()).await
    }

    /// Upsert a record with an explicit timestamp in milliseconds.
    ///
    /// Idempotent; an existing key keeps its identity and only the
    /// timestamp changes.
    pub async fn put_at(&self, key: &str, timestamp_ms: i64) -> Result<(), Error> {
        let collection = self.collection.clone();
        let key = key.to_string();
        self.db
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO records (collection, key, time) VALUES (?1, ?2, ?3)
                     ON CONFLICT(collection, key) DO UPDATE SET time = excluded.time",
                    params![collection, key, timestamp_ms],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::StoreUnavailable)
    }

    /// Delete a record if present; no-op otherwise.
    pub async fn remove(&self, key: &str) -> Result<(), Error> {
        let collection = self.collection.clone();
        let key = key.to_string();
        self.db
            .conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM records WHERE collection = ?1 AND key = ?2",
                    params![collection, key],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::StoreUnavailable)
    }

    /// Snapshot of all records as key -> timestamp.
    ///
    /// The snapshot observes a commit point; concurrent writers may land
    /// before or after it.
    pub async fn get_all(&self) -> Result<BTreeMap<String, i64>, Error> {
        let collection = self.collection.clone();
        self.db
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT key, time FROM records WHERE collection = ?1")?;
                let rows = stmt
                    .query_map(params![collection], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<BTreeMap<String, i64>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::StoreUnavailable)
    }

    /// Number of records currently in the collection.
    pub async fn len(&self) -> Result<usize, Error> {
        let collection = self.collection.clone();
        self.db
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM records WHERE collection = ?1",
                    params![collection],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::StoreUnavailable)
    }

    /// Remove every record strictly older than `max_age`.
    ///
    /// A record is removed iff `now - timestamp > max_age`. The matching
    /// keys are collected in a read-only scan first, then deleted as a
    /// batch inside the same transaction, and returned to the caller so
    /// mirrored stores can drop their entries too.
    pub async fn remove_older_than(&self, max_age: Duration) -> Result<Vec<String>, Error> {
        let collection = self.collection.clone();
        let cutoff = chrono::Utc::now().timestamp_millis() - max_age.as_millis() as i64;
        self.db
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let keys: Vec<String> = {
                    let mut stmt = tx.prepare(
                        "SELECT key FROM records
                         WHERE collection = ?1 AND time < ?2
                         ORDER BY time ASC, key ASC",
                    )?;
                    stmt.query_map(params![collection, cutoff], |row| row.get(0))?
                        .collect::<Result<_, _>>()?
                };
                for key in &keys {
                    tx.execute(
                        "DELETE FROM records WHERE collection = ?1 AND key = ?2",
                        params![collection, key],
                    )?;
                }
                tx.commit()?;
                Ok(keys)
            })
            .await
            .map_err(Error::StoreUnavailable)
    }

    /// Remove the oldest records until at most `max_entries` remain.
    ///
    /// Ties on equal timestamps break by key, so the removal set is
    /// deterministic for a given store state. Returns the removed keys,
    /// oldest first.
    pub async fn remove_excess_by_count(&self, max_entries: usize) -> Result<Vec<String>, Error> {
        let collection = self.collection.clone();
        let max = max_entries as i64;
        self.db
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let count: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM records WHERE collection = ?1",
                    params![collection],
                    |row| row.get(0),
                )?;
                if count <= max {
                    tx.commit()?;
                    return Ok(Vec::new());
                }

                let excess = count - max;
                let keys: Vec<String> = {
                    let mut stmt = tx.prepare(
                        "SELECT key FROM records
                         WHERE collection = ?1
                         ORDER BY time ASC, key ASC
                         LIMIT ?2",
                    )?;
                    stmt.query_map(params![collection, excess], |row| row.get(0))?
                        .collect::<Result<_, _>>()?
                };
                for key in &keys {
                    tx.execute(
                        "DELETE FROM records WHERE collection = ?1 AND key = ?2",
                        params![collection, key],
                    )?;
                }
                tx.commit()?;
                Ok(keys)
            })
            .await
            .map_err(Error::StoreUnavailable)
    }

    /// Remove every record in the collection.
    pub async fn remove_all(&self) -> Result<(), Error> {
        let collection = self.collection.clone();
        self.db
            .conn
            .call(move |conn| {
                conn.execute("DELETE FROM records WHERE collection = ?1", params![collection])?;
                Ok(())
            })
            .await
            .map_err(Error::StoreUnavailable)
    }
}
