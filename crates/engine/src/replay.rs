//! Retry/replay of queued network operations.
//!
//! Beacons that failed while offline are recorded in the `analytics-log`
//! collection, keyed by their full request URL with the enqueue time as the
//! timestamp. A drain pass replays the snapshot sequentially and removes a
//! record only after its request is confirmed delivered, which keeps the
//! queue crash-safe and gives at-least-once delivery: a restart mid-drain
//! simply replays the unresolved entries on the next trigger.

use offsync_core::store::RecordStore;
use offsync_core::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

use crate::transport::{FetchOptions, Transport};

/// Synthetic event reported once connectivity returns, so offline visits
/// are still counted.
const OFFLINE_EVENT_URL: &str =
    "https://www.google-analytics.com/collect?v=1&t=event&ex=SetIsOffline&ea=Yes&ni=1";

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    /// Keys delivered and removed from the queue.
    pub replayed: Vec<String>,
    /// Entries still queued after the pass (failed again, or enqueued
    /// while draining).
    pub pending: usize,
    /// Keys dropped because they could never replay (unparseable URLs).
    pub discarded: Vec<String>,
    /// True if this trigger found a drain already in progress and did
    /// nothing.
    pub coalesced: bool,
}

/// Replays queued operations on connectivity or scheduling triggers.
#[derive(Clone)]
pub struct ReplayEngine {
    queue: RecordStore,
    transport: Arc<dyn Transport>,
    draining: Arc<AtomicBool>,
}

/// Clears the drain flag even if a pass bails out early.
struct DrainGuard(Arc<AtomicBool>);

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReplayEngine {
    pub fn new(queue: RecordStore, transport: Arc<dyn Transport>) -> Self {
        Self { queue, transport, draining: Arc::new(AtomicBool::new(false)) }
    }

    /// Queue a beacon URL for later replay. Enqueue time is recorded so
    /// the replay can report how long the event sat in the queue.
    pub async fn enqueue(&self, url: &str) -> Result<(), Error> {
        self.queue.put(url).await
    }

    /// Queue a beacon that just failed. Pageview beacons additionally queue
    /// a synthetic offline-visit event carrying the same client and
    /// property ids.
    pub async fn enqueue_failed_beacon(&self, url: &str) -> Result<(), Error> {
        self.enqueue(url).await?;
        tracing::debug!("queued failed beacon: {url}");

        if let Ok(parsed) = Url::parse(url) {
            let mut cid = None;
            let mut tid = None;
            let mut is_pageview = false;
            for (k, v) in parsed.query_pairs() {
                match k.as_ref() {
                    "t" if v == "pageview" => is_pageview = true,
                    "cid" => cid = Some(v.into_owned()),
                    "tid" => tid = Some(v.into_owned()),
                    _ => {}
                }
            }
            if is_pageview
                && let (Some(cid), Some(tid)) = (cid, tid)
            {
                let offline_event = format!("{OFFLINE_EVENT_URL}&cid={cid}&tid={tid}");
                self.enqueue(&offline_event).await?;
            }
        }

        Ok(())
    }

    /// Replay all queued operations.
    ///
    /// Takes a snapshot of the queue at trigger time and processes it
    /// sequentially: a delivered request removes its record, a failure
    /// leaves the record for the next trigger and the pass moves on. A
    /// second trigger during an active drain coalesces into a no-op.
    pub async fn drain(&self) -> Result<DrainReport, Error> {
        if self.draining.swap(true, Ordering::AcqRel) {
            tracing::debug!("drain already in progress, coalescing trigger");
            return Ok(DrainReport { coalesced: true, ..Default::default() });
        }
        let _guard = DrainGuard(self.draining.clone());

        let snapshot = self.queue.get_all().await?;
        let mut replayed = Vec::new();
        let mut discarded = Vec::new();

        for (key, enqueued_ms) in snapshot {
            let request_url = match delayed_url(&key, enqueued_ms) {
                Ok(url) => url,
                Err(err) => {
                    // Unparseable keys can never replay; drop them, but
                    // report the droppage so it stays observable.
                    tracing::warn!("discarding malformed queue entry {key}: {err}");
                    self.queue.remove(&key).await?;
                    discarded.push(key);
                    continue;
                }
            };

            // A delivered beacon counts as replayed regardless of its HTTP
            // status; only transport failures keep the record queued.
            match self.transport.fetch(&request_url, FetchOptions::default()).await {
                Ok(_) => {
                    self.queue.remove(&key).await?;
                    tracing::debug!("replayed queued request: {request_url}");
                    replayed.push(key);
                }
                Err(err) => {
                    tracing::debug!("replay of {key} failed, keeping queued: {err}");
                }
            }
        }

        let pending = self.queue.len().await?;
        Ok(DrainReport { replayed, pending, discarded, coalesced: false })
    }

    /// Number of operations currently queued.
    pub async fn pending(&self) -> Result<usize, Error> {
        self.queue.len().await
    }
}

/// Rebuild a queued URL with a `qt` (queue time) parameter holding the
/// milliseconds the entry waited before replay.
fn delayed_url(key: &str, enqueued_ms: i64) -> Result<Url, Error> {
    let mut url = Url::parse(key).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    let queue_time = (chrono::Utc::now().timestamp_millis() - enqueued_ms).max(0);
    url.query_pairs_mut().append_pair("qt", &queue_time.to_string());
    Ok(url)
}
