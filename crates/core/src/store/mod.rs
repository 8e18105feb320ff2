//! SQLite-backed durable stores for the offline-sync engine.
//!
//! One database file holds every collection, accessed async via
//! tokio-rusqlite. It provides:
//!
//! - [`RecordStore`]: named, time-indexed `(key, timestamp)` collections used
//!   as the cache-eviction index and as pending-operation queues
//! - [`ContentCache`]: an opaque key -> body store for cached responses
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod content;
pub mod migrations;
pub mod records;

pub use crate::Error;

pub use connection::StoreDb;
pub use content::{ContentCache, ContentEntry};
pub use records::RecordStore;
