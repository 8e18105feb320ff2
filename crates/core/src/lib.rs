//! Core types and storage for the offsync engine.
//!
//! This crate provides:
//! - Durable record store and content cache with a SQLite backend
//! - Age- and count-based eviction
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod error;
pub mod evict;
pub mod store;

pub use config::AppConfig;
pub use error::Error;
pub use store::{ContentCache, ContentEntry, RecordStore, StoreDb};
