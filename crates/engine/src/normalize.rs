//! URL normalization for consistent cache keys.
//!
//! Every strategy normalizes its input exactly once at the boundary, so the
//! record index and the content cache stay keyed identically. Tracking
//! query parameters are stripped here because they would otherwise poison
//! the cache with one entry per campaign link.
//!
//! Normalization steps:
//! 1. Trim leading/trailing whitespace
//! 2. Resolve relative references against the configured origin
//! 3. Lowercase the host, remove the fragment
//! 4. Drop `utm_*` query parameters, preserving the order of the rest

use offsync_core::Error;
use url::Url;

/// Normalize a URL string into a cache key, resolving relative paths
/// against `base`.
///
/// Idempotent: normalizing an already-normalized URL returns it unchanged.
pub fn normalize(input: &str, base: &Url) -> Result<Url, Error> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty URL".into()));
    }

    let mut parsed = base.join(trimmed).map_err(|e| Error::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(Error::InvalidUrl(format!("unsupported scheme: {scheme}"))),
    }

    parsed.set_fragment(None);

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !k.starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        let mut mutator = parsed.query_pairs_mut();
        mutator.clear();
        for (k, v) in &kept {
            mutator.append_pair(k, v);
        }
        drop(mutator);
    }

    Ok(parsed)
}
