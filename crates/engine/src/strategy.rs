//! Fetch strategies composing the content cache, the record index, and the
//! network transport.
//!
//! Three strategies are offered:
//!
//! - cache-first: prefer cached content, fetch on miss
//! - cache-first with background refresh: answer from cache immediately
//!   while the network updates the entry for next time
//! - network-first with cache fallback: for navigations that should be
//!   fresh when possible but still render something offline
//!
//! Every successful write also upserts the `cache-index` record for the key
//! and schedules eviction enforcement; the caller never waits for cleanup.

use bytes::Bytes;
use offsync_core::evict::{self, EvictionLimits};
use offsync_core::store::{ContentCache, ContentEntry, RecordStore};
use offsync_core::Error;
use tokio::sync::broadcast;
use url::Url;

use crate::normalize::normalize;
use crate::transport::{FetchOptions, NetworkResponse, Transport};
use std::sync::Arc;

/// Where a returned piece of content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    Cache,
    Network,
    Fallback,
}

/// Result of a strategy invocation.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub key: String,
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub source: ContentSource,
}

impl FetchedContent {
    fn from_cache(entry: ContentEntry) -> Self {
        Self {
            key: entry.key,
            status: entry.status,
            content_type: entry.content_type,
            body: Bytes::from(entry.body),
            source: ContentSource::Cache,
        }
    }

    fn from_network(response: NetworkResponse) -> Self {
        Self {
            key: response.url.as_str().to_string(),
            status: response.status,
            content_type: response.content_type,
            body: response.body,
            source: ContentSource::Network,
        }
    }
}

/// Fetch strategy engine over a managed cache.
///
/// Cloning shares the underlying stores, transport, and update channel.
#[derive(Clone)]
pub struct FetchEngine {
    cache: ContentCache,
    index: RecordStore,
    transport: Arc<dyn Transport>,
    limits: EvictionLimits,
    base: Url,
    update_tx: broadcast::Sender<String>,
}

impl FetchEngine {
    pub fn new(
        cache: ContentCache,
        index: RecordStore,
        transport: Arc<dyn Transport>,
        base: Url,
        limits: EvictionLimits,
    ) -> Self {
        let (update_tx, _) = broadcast::channel(32);
        Self { cache, index, transport, limits, base, update_tx }
    }

    /// Subscribe to cache-entry-updated signals: a key is sent whenever a
    /// background refresh replaced an entry with different bytes, so live
    /// consumers of that key can re-render.
    pub fn updates(&self) -> broadcast::Receiver<String> {
        self.update_tx.subscribe()
    }

    /// Normalize a caller-supplied URL into a cache key.
    pub fn key_for(&self, url: &str) -> Result<Url, Error> {
        normalize(url, &self.base)
    }

    /// Return cached content for the key, or fetch and cache it on a miss.
    ///
    /// A network failure on the miss path propagates; nothing is written.
    pub async fn cache_first(&self, url: &str) -> Result<FetchedContent, Error> {
        let key = self.key_for(url)?;
        if let Some(entry) = self.lookup(key.as_str()).await {
            return Ok(FetchedContent::from_cache(entry));
        }
        self.fetch_and_cache_inner(&key, FetchOptions::default()).await
    }

    /// Return cached content immediately while the network refreshes the
    /// entry in the background; on a cache miss the network outcome is
    /// returned directly.
    pub async fn cache_first_with_refresh(&self, url: &str) -> Result<FetchedContent, Error> {
        let key = self.key_for(url)?;

        let this = self.clone();
        let refresh_key = key.clone();
        let refresh = tokio::spawn(async move {
            this.fetch_and_cache_inner(&refresh_key, FetchOptions::default()).await
        });

        if let Some(entry) = self.lookup(key.as_str()).await {
            // The refresh task keeps running; divergence is signaled on the
            // update channel once it lands.
            return Ok(FetchedContent::from_cache(entry));
        }

        refresh
            .await
            .map_err(|e| Error::Network(format!("refresh task failed: {e}")))?
    }

    /// Try the network first; on failure fall back to cached content under
    /// `fallback_key`, re-stamped with a non-success status so the caller
    /// knows it is rendering offline content.
    pub async fn network_first(&self, url: &str, fallback_key: &str) -> Result<FetchedContent, Error> {
        let key = self.key_for(url)?;
        match self.fetch_and_cache_inner(&key, FetchOptions::default()).await {
            Ok(content) => Ok(content),
            Err(err) => {
                tracing::debug!("network-first fetch failed ({err}), trying fallback {fallback_key}");
                match self.cache_first(fallback_key).await {
                    Ok(mut fallback) => {
                        fallback.status = Some(503);
                        fallback.source = ContentSource::Fallback;
                        Ok(fallback)
                    }
                    Err(_) => Err(Error::NotFound(fallback_key.to_string())),
                }
            }
        }
    }

    /// Cache-first load of a third-party asset in no-cors mode. The opaque
    /// response has no readable status and is cached unconditionally.
    pub async fn external_cache_first(&self, url: &str) -> Result<FetchedContent, Error> {
        let key = self.key_for(url)?;
        if let Some(entry) = self.lookup(key.as_str()).await {
            return Ok(FetchedContent::from_cache(entry));
        }
        self.fetch_and_cache_inner(&key, FetchOptions::no_cors()).await
    }

    /// Fetch from the network, caching a successful response. This is the
    /// success path shared by every strategy; also used directly to warm an
    /// entry without consulting the cache.
    pub async fn fetch_and_cache(&self, url: &str) -> Result<FetchedContent, Error> {
        let key = self.key_for(url)?;
        self.fetch_and_cache_inner(&key, FetchOptions::default()).await
    }

    /// Warm the cache for a set of keys. Per-key failures are logged and
    /// skipped; warming never fails the caller.
    pub async fn precache(&self, keys: &[String]) {
        for key in keys {
            if let Err(err) = self.cache_first(key).await {
                tracing::warn!("precache of {key} failed: {err}");
            }
        }
    }

    async fn fetch_and_cache_inner(&self, key: &Url, opts: FetchOptions) -> Result<FetchedContent, Error> {
        let response = self.transport.fetch(key, opts).await?;
        if response.is_cacheable() {
            self.remember(&response).await;
        }
        Ok(FetchedContent::from_network(response))
    }

    /// Cache lookup that treats an unavailable store as a miss, so the
    /// strategy degrades to network-only instead of failing the response.
    async fn lookup(&self, key: &str) -> Option<ContentEntry> {
        match self.cache.get(key).await {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("content cache unavailable, treating {key} as a miss: {err}");
                None
            }
        }
    }

    /// Write a response into the content cache, upsert its index record,
    /// signal divergence, and schedule eviction. Storage failures degrade
    /// to "proceed without durability" and never reach the caller.
    async fn remember(&self, response: &NetworkResponse) {
        let key = response.url.as_str();

        let old_body = match self.cache.get(key).await {
            Ok(entry) => entry.map(|e| e.body),
            Err(err) => {
                tracing::warn!("content cache read failed for {key}: {err}");
                None
            }
        };

        let entry = ContentEntry::new(
            key,
            response.body.to_vec(),
            response.content_type.clone(),
            response.status,
        );
        if let Err(err) = self.cache.put(entry).await {
            tracing::warn!("content cache write failed for {key}, serving without caching: {err}");
            return;
        }
        tracing::debug!("added to cache: {key}");

        if let Some(old) = old_body
            && old != response.body
        {
            let _ = self.update_tx.send(key.to_string());
        }

        if let Err(err) = self.index.put(key).await {
            tracing::warn!("record store unavailable, skipping index update for {key}: {err}");
        }

        // Cleanup must not gate response delivery.
        let index = self.index.clone();
        let cache = self.cache.clone();
        let limits = self.limits;
        tokio::spawn(async move {
            if let Err(err) = evict::enforce(&index, &cache, limits).await {
                tracing::warn!("cache eviction failed: {err}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{stores, StubTransport};
    use offsync_core::store::StoreDb;
    use std::time::Duration;

    const BASE: &str = "https://news.example.com";

    async fn engine_with(transport: Arc<StubTransport>) -> FetchEngine {
        let (index, cache) = stores().await;
        FetchEngine::new(
            cache,
            index,
            transport,
            Url::parse(BASE).unwrap(),
            EvictionLimits::default(),
        )
    }

    #[tokio::test]
    async fn test_cache_first_fetches_once() {
        let transport = Arc::new(StubTransport::new());
        transport.with_page("https://news.example.com/articles/1", b"<html>one</html>");
        let engine = engine_with(transport.clone()).await;

        let first = engine.cache_first("/articles/1").await.unwrap();
        assert_eq!(first.source, ContentSource::Network);

        let second = engine.cache_first("/articles/1").await.unwrap();
        assert_eq!(second.source, ContentSource::Cache);
        assert_eq!(second.body, first.body);

        assert_eq!(transport.calls_for("https://news.example.com/articles/1"), 1);
    }

    #[tokio::test]
    async fn test_cache_first_normalizes_tracking_params() {
        let transport = Arc::new(StubTransport::new());
        transport.with_page("https://news.example.com/articles/1", b"<html>one</html>");
        let engine = engine_with(transport.clone()).await;

        engine.cache_first("/articles/1?utm_source=mail").await.unwrap();
        let second = engine.cache_first("/articles/1").await.unwrap();

        assert_eq!(second.source, ContentSource::Cache);
        assert_eq!(transport.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_first_failure_writes_nothing() {
        let transport = Arc::new(StubTransport::new());
        transport.failing("https://news.example.com/articles/1");
        let engine = engine_with(transport).await;

        let result = engine.cache_first("/articles/1").await;
        assert!(matches!(result, Err(Error::Network(_))));

        // Nothing cached, so the next call goes to the network again.
        let again = engine.cache_first("/articles/1").await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_network_only() {
        let transport = Arc::new(StubTransport::new());
        transport.with_page("https://news.example.com/articles/1", b"<html>one</html>");
        let db = StoreDb::open_in_memory().await.unwrap();
        let engine = FetchEngine::new(
            ContentCache::new(db.clone()),
            RecordStore::new(db.clone(), "cache-index"),
            transport.clone(),
            Url::parse(BASE).unwrap(),
            EvictionLimits::default(),
        );
        db.close().await.unwrap();

        // Lookup treats the dead store as a miss and the write is dropped;
        // the response still reaches the caller.
        let first = engine.cache_first("/articles/1").await.unwrap();
        assert_eq!(first.source, ContentSource::Network);

        let second = engine.cache_first("/articles/1").await.unwrap();
        assert_eq!(second.source, ContentSource::Network);
        assert_eq!(transport.calls_for("https://news.example.com/articles/1"), 2);
    }

    #[tokio::test]
    async fn test_non_success_response_not_cached() {
        let transport = Arc::new(StubTransport::new());
        transport.with_status("https://news.example.com/gone", 404, b"not found");
        let engine = engine_with(transport.clone()).await;

        let first = engine.cache_first("/gone").await.unwrap();
        assert_eq!(first.status, Some(404));
        assert_eq!(first.source, ContentSource::Network);

        engine.cache_first("/gone").await.unwrap();
        assert_eq!(transport.calls_for("https://news.example.com/gone"), 2);
    }

    #[tokio::test]
    async fn test_successful_fetch_registers_record() {
        let transport = Arc::new(StubTransport::new());
        transport.with_page("https://news.example.com/articles/1", b"<html>one</html>");
        let (index, cache) = stores().await;
        let engine = FetchEngine::new(
            cache.clone(),
            index.clone(),
            transport,
            Url::parse(BASE).unwrap(),
            EvictionLimits::default(),
        );

        engine.cache_first("/articles/1").await.unwrap();

        let records = index.get_all().await.unwrap();
        assert!(records.contains_key("https://news.example.com/articles/1"));
        assert!(cache.get("https://news.example.com/articles/1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_returns_cache_and_signals_divergence() {
        let transport = Arc::new(StubTransport::new());
        transport.with_page("https://news.example.com/articles/1", b"v1");
        let engine = engine_with(transport.clone()).await;

        engine.cache_first("/articles/1").await.unwrap();
        transport.with_page("https://news.example.com/articles/1", b"v2");

        let mut updates = engine.updates();
        let content = engine.cache_first_with_refresh("/articles/1").await.unwrap();

        // Stale copy served immediately.
        assert_eq!(content.source, ContentSource::Cache);
        assert_eq!(content.body, Bytes::from_static(b"v1"));

        // Background refresh lands and signals the changed key.
        let key = tokio::time::timeout(Duration::from_secs(2), updates.recv())
            .await
            .expect("no divergence signal")
            .unwrap();
        assert_eq!(key, "https://news.example.com/articles/1");

        let refreshed = engine.cache_first("/articles/1").await.unwrap();
        assert_eq!(refreshed.body, Bytes::from_static(b"v2"));
    }

    #[tokio::test]
    async fn test_refresh_identical_body_no_signal() {
        let transport = Arc::new(StubTransport::new());
        transport.with_page("https://news.example.com/articles/1", b"v1");
        let engine = engine_with(transport.clone()).await;

        engine.cache_first("/articles/1").await.unwrap();

        let mut updates = engine.updates();
        engine.cache_first_with_refresh("/articles/1").await.unwrap();

        let signal = tokio::time::timeout(Duration::from_millis(300), updates.recv()).await;
        assert!(signal.is_err(), "identical bytes must not signal an update");
    }

    #[tokio::test]
    async fn test_refresh_miss_returns_network() {
        let transport = Arc::new(StubTransport::new());
        transport.with_page("https://news.example.com/articles/9", b"fresh");
        let engine = engine_with(transport).await;

        let content = engine.cache_first_with_refresh("/articles/9").await.unwrap();
        assert_eq!(content.source, ContentSource::Network);
        assert_eq!(content.body, Bytes::from_static(b"fresh"));
    }

    #[tokio::test]
    async fn test_network_first_prefers_network() {
        let transport = Arc::new(StubTransport::new());
        transport.with_page("https://news.example.com/articles/1", b"live");
        let engine = engine_with(transport).await;

        let content = engine.network_first("/articles/1", "/_/offline/").await.unwrap();
        assert_eq!(content.source, ContentSource::Network);
    }

    #[tokio::test]
    async fn test_network_first_falls_back_with_503() {
        let transport = Arc::new(StubTransport::new());
        transport.with_page("https://news.example.com/_/offline/", b"offline page");
        let engine = engine_with(transport.clone()).await;

        // Warm the fallback entry, then take the article endpoint offline.
        engine.cache_first("/_/offline/").await.unwrap();
        transport.failing("https://news.example.com/articles/1");

        let content = engine.network_first("/articles/1", "/_/offline/").await.unwrap();
        assert_eq!(content.source, ContentSource::Fallback);
        assert_eq!(content.status, Some(503));
        assert_eq!(content.body, Bytes::from_static(b"offline page"));
    }

    #[tokio::test]
    async fn test_network_first_double_miss_is_not_found() {
        let transport = Arc::new(StubTransport::new());
        transport.failing("https://news.example.com/articles/1");
        transport.failing("https://news.example.com/_/offline/");
        let engine = engine_with(transport).await;

        let result = engine.network_first("/articles/1", "/_/offline/").await;
        assert!(matches!(result, Err(Error::NotFound(key)) if key == "/_/offline/"));
    }

    #[tokio::test]
    async fn test_external_cache_first_is_opaque() {
        let transport = Arc::new(StubTransport::new());
        transport.with_page("https://cdn.example.org/font.woff2", b"glyphs");
        let engine = engine_with(transport.clone()).await;

        let first = engine.external_cache_first("https://cdn.example.org/font.woff2").await.unwrap();
        assert_eq!(first.status, None);

        let second = engine.external_cache_first("https://cdn.example.org/font.woff2").await.unwrap();
        assert_eq!(second.source, ContentSource::Cache);
        assert_eq!(transport.calls_for("https://cdn.example.org/font.woff2"), 1);
    }

    #[tokio::test]
    async fn test_precache_skips_failures() {
        let transport = Arc::new(StubTransport::new());
        transport.with_page("https://news.example.com/", b"home");
        transport.failing("https://news.example.com/_/offline/");
        let engine = engine_with(transport).await;

        engine
            .precache(&["/".to_string(), "/_/offline/".to_string()])
            .await;

        let home = engine.cache_first("/").await.unwrap();
        assert_eq!(home.source, ContentSource::Cache);
    }

    #[tokio::test]
    async fn test_eviction_runs_after_write() {
        let transport = Arc::new(StubTransport::new());
        for path in ["/1", "/2", "/3"] {
            transport.with_page(&format!("{BASE}{path}"), b"body");
        }
        let (index, cache) = stores().await;
        let limits = EvictionLimits { max_age: Duration::from_secs(3600), max_entries: 2 };
        let engine = FetchEngine::new(
            cache,
            index.clone(),
            transport,
            Url::parse(BASE).unwrap(),
            limits,
        );

        for path in ["/1", "/2", "/3"] {
            engine.cache_first(path).await.unwrap();
        }

        // Enforcement is fire-and-forget; poll until it settles.
        for _ in 0..100 {
            if index.len().await.unwrap() <= 2 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("eviction never bounded the index");
    }
}
