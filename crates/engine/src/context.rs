//! Top-level assembly of the engine from configuration.
//!
//! One [`Context`] owns the long-lived instances a process needs: the
//! shared database, the HTTP transport, the fetch and replay engines, the
//! navigation controller, and the trigger dispatcher. [`Context::warm`]
//! plays the install-time role of precaching the app shell and the
//! configured key list.

use std::sync::Arc;

use offsync_core::evict::EvictionLimits;
use offsync_core::store::{ContentCache, RecordStore, StoreDb};
use offsync_core::{AppConfig, Error};
use url::Url;

use crate::events::Dispatcher;
use crate::nav::NavigationController;
use crate::replay::ReplayEngine;
use crate::strategy::FetchEngine;
use crate::transport::{HttpTransport, Transport, TransportConfig};

/// Collection holding eviction metadata for cached content.
const CACHE_INDEX: &str = "cache-index";
/// Collection holding queued beacon URLs awaiting replay.
const ANALYTICS_LOG: &str = "analytics-log";

/// Engine instances assembled from one configuration.
pub struct Context {
    pub config: AppConfig,
    pub engine: FetchEngine,
    pub replay: ReplayEngine,
    pub nav: NavigationController,
    pub dispatcher: Dispatcher,
}

impl Context {
    /// Open the database at `config.db_path`, build the HTTP transport
    /// from the config, and assemble the engines.
    pub async fn from_config(config: AppConfig) -> Result<Self, Error> {
        let db = StoreDb::open(&config.db_path).await?;
        let transport: Arc<dyn Transport> =
            Arc::new(HttpTransport::new(TransportConfig::from_app_config(&config))?);
        Self::new(config, db, transport)
    }

    /// Assemble the engines over an already-open database and transport.
    pub fn new(config: AppConfig, db: StoreDb, transport: Arc<dyn Transport>) -> Result<Self, Error> {
        let base = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let limits = EvictionLimits {
            max_age: config.cache_max_age(),
            max_entries: config.cache_max_entries,
        };

        let cache = ContentCache::new(db.clone());
        let index = RecordStore::new(db.clone(), CACHE_INDEX);
        let queue = RecordStore::new(db, ANALYTICS_LOG);

        let engine = FetchEngine::new(cache, index, transport.clone(), base, limits);
        let replay = ReplayEngine::new(queue, transport.clone());
        let nav = NavigationController::new(engine.clone(), config.offline_key.clone());
        let dispatcher = Dispatcher::new(
            replay.clone(),
            engine.clone(),
            transport,
            config.latest_article_key.clone(),
        );

        Ok(Self { config, engine, replay, nav, dispatcher })
    }

    /// Warm the cache with the app shell and the configured precache list.
    /// Per-key failures are logged and skipped.
    pub async fn warm(&self) {
        let mut keys = Vec::with_capacity(self.config.precache.len() + 1);
        keys.push(self.config.app_shell_key.clone());
        keys.extend(self.config.precache.iter().cloned());
        self.engine.precache(&keys).await;
    }
}
