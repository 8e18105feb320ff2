//! Unified error types for offsync.
//!
//! Durable-storage failures are deliberately non-fatal for the fetch
//! strategies: they degrade to cache-only/network-only behavior instead of
//! failing the user-visible response.

use tokio_rusqlite::rusqlite;

/// Unified error types for the offline-sync engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network fetch failed (offline, DNS, timeout) or returned a
    /// non-success status that a strategy treats as a failure.
    #[error("NETWORK_FAILURE: {0}")]
    Network(String),

    /// Durable storage could not be opened or committed.
    #[error("STORE_UNAVAILABLE: {0}")]
    StoreUnavailable(tokio_rusqlite::Error),

    /// Both the network and the fallback cache entry missed. Carries the
    /// fallback key so the caller can still render an offline page.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// A schema migration failed to apply; fatal for that store instance.
    #[error("SCHEMA_UPGRADE_FAILED: {0}")]
    SchemaUpgrade(String),

    /// URL could not be parsed or normalized.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Malformed input from a collaborator (e.g. an article descriptor
    /// that does not parse).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => {
                Error::StoreUnavailable(tokio_rusqlite::Error::ConnectionClosed)
            }
            tokio_rusqlite::Error::Close(c) => Error::StoreUnavailable(tokio_rusqlite::Error::Close(c)),
            _ => Error::StoreUnavailable(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::StoreUnavailable(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StoreUnavailable(tokio_rusqlite::Error::Error(err))
    }
}
