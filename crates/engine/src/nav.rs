//! Single-flight navigation with cooperative cancellation.
//!
//! Starting a navigation supersedes any in-flight one: each attempt
//! captures a generation number, and only the attempt still holding the
//! latest generation at commit time may mutate visible state. Superseded
//! attempts finish their I/O but discard the result silently. Exactly one
//! committed document exists at a time; committing a new one drops the
//! previous one's resources synchronously.

use bytes::Bytes;
use offsync_core::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::strategy::{FetchEngine, FetchedContent};

/// A committed navigation target.
#[derive(Debug, Clone)]
pub struct Document {
    pub url: String,
    pub title: Option<String>,
    pub body: Bytes,
    /// `Some(503)` when this is offline fallback content.
    pub status: Option<u16>,
}

/// Signals observers can subscribe to, e.g. for progress indicators.
#[derive(Debug, Clone)]
pub enum NavEvent {
    Started { url: String },
    Committed { url: String, title: Option<String> },
}

/// Result of one navigation attempt.
#[derive(Debug, Clone)]
pub enum NavOutcome {
    Committed(Arc<Document>),
    /// A newer navigation started before this one finished; nothing was
    /// committed and no signal was emitted.
    Superseded,
}

/// Drives page navigations over the fetch engine.
pub struct NavigationController {
    engine: FetchEngine,
    offline_key: String,
    generation: AtomicU64,
    committed: Mutex<Option<Arc<Document>>>,
    events: broadcast::Sender<NavEvent>,
}

impl NavigationController {
    pub fn new(engine: FetchEngine, offline_key: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            engine,
            offline_key: offline_key.into(),
            generation: AtomicU64::new(0),
            committed: Mutex::new(None),
            events,
        }
    }

    /// Subscribe to navigation signals.
    pub fn events(&self) -> broadcast::Receiver<NavEvent> {
        self.events.subscribe()
    }

    /// The currently committed document, if any.
    pub fn current(&self) -> Option<Arc<Document>> {
        self.committed.lock().unwrap().clone()
    }

    /// Navigate to a URL.
    ///
    /// Invalidates any in-flight navigation, emits `Started`, fetches the
    /// page (network first, cached content as offline fallback), and
    /// commits the parsed document unless a newer navigation superseded
    /// this one meanwhile.
    pub async fn navigate(&self, url: &str) -> Result<NavOutcome, Error> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let _ = self.events.send(NavEvent::Started { url: url.to_string() });

        let content = self.engine.network_first(url, &self.offline_key).await?;
        let document = build_document(url, content);

        // Cooperative cancellation: in-flight I/O ran to completion, but a
        // stale generation may not touch visible state.
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("navigation to {url} superseded, discarding result");
            return Ok(NavOutcome::Superseded);
        }

        let document = Arc::new(document);
        {
            let mut committed = self.committed.lock().unwrap();
            // Re-check under the lock: a newer attempt may have bumped the
            // generation and committed since the check above.
            if self.generation.load(Ordering::SeqCst) != generation {
                return Ok(NavOutcome::Superseded);
            }
            // Previous document's resources are released here, before the
            // new one becomes visible.
            let _previous = committed.take();
            *committed = Some(document.clone());
        }

        let _ = self.events.send(NavEvent::Committed {
            url: document.url.clone(),
            title: document.title.clone(),
        });

        Ok(NavOutcome::Committed(document))
    }
}

fn build_document(url: &str, content: FetchedContent) -> Document {
    let title = parse_title(&content.body);
    Document { url: url.to_string(), title, body: content.body, status: content.status }
}

/// Extract the document title, if the body parses as HTML and has one.
pub(crate) fn parse_title(body: &[u8]) -> Option<String> {
    let html = String::from_utf8_lossy(body);
    let document = scraper::Html::parse_document(&html);
    let selector = scraper::Selector::parse("title").ok()?;
    let title = document.select(&selector).next()?.text().collect::<String>();
    let title = title.trim();
    if title.is_empty() { None } else { Some(title.to_string()) }
}
