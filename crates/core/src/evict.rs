//! Cache eviction: age- and count-based expiry over the record index.
//!
//! Pure composition of the record store operations; every key the index
//! drops is also deleted from the content cache so the two stores stay in
//! lockstep. Deletions are idempotent, so concurrent enforcement passes
//! converge to the same bounded state.

use std::time::Duration;

use crate::store::{ContentCache, RecordStore};
use crate::Error;

/// Eviction bounds for one managed cache.
#[derive(Debug, Clone, Copy)]
pub struct EvictionLimits {
    /// Records older than this are expired.
    pub max_age: Duration,
    /// At most this many records are retained.
    pub max_entries: usize,
}

impl Default for EvictionLimits {
    fn default() -> Self {
        Self { max_age: Duration::from_secs(60 * 60 * 24 * 60), max_entries: 120 }
    }
}

/// Apply both bounds and mirror every removal into the content cache.
///
/// Returns the full set of evicted keys. Runs after cache writes via
/// `tokio::spawn`; the write path never awaits it.
pub async fn enforce(
    index: &RecordStore,
    cache: &ContentCache,
    limits: EvictionLimits,
) -> Result<Vec<String>, Error> {
    let mut removed = index.remove_older_than(limits.max_age).await?;
    removed.extend(index.remove_excess_by_count(limits.max_entries).await?);

    for key in &removed {
        cache.delete(key).await?;
    }

    if !removed.is_empty() {
        tracing::debug!(count = removed.len(), "evicted cache entries");
    }

    Ok(removed)
}
