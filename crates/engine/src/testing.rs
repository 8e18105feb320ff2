//! Test support: scripted transports and store fixtures.

use crate::transport::{FetchOptions, NetworkResponse, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use offsync_core::Error;
use offsync_core::store::{ContentCache, RecordStore, StoreDb};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

#[derive(Clone)]
struct Route {
    body: Bytes,
    status: Option<u16>,
    delay: Duration,
    failures_before_success: usize,
    always_fail: bool,
}

impl Route {
    fn ok(body: &[u8]) -> Self {
        Self {
            body: Bytes::copy_from_slice(body),
            status: Some(200),
            delay: Duration::ZERO,
            failures_before_success: 0,
            always_fail: false,
        }
    }
}

/// Transport with scripted per-URL outcomes and a call log.
///
/// Routes match by longest prefix, so beacon replays with appended query
/// parameters still hit their script.
#[derive(Default)]
pub(crate) struct StubTransport {
    calls: Mutex<Vec<String>>,
    routes: Mutex<Vec<(String, Route)>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn route(&self, url: &str, route: Route) {
        let mut routes = self.routes.lock().unwrap();
        routes.retain(|(key, _)| key != url);
        routes.push((url.to_string(), route));
    }

    /// Serve a 200 response with the given body.
    pub fn with_page(&self, url: &str, body: &[u8]) {
        self.route(url, Route::ok(body));
    }

    /// Serve a response with an explicit status.
    pub fn with_status(&self, url: &str, status: u16, body: &[u8]) {
        self.route(url, Route { status: Some(status), ..Route::ok(body) });
    }

    /// Always fail with a network error.
    pub fn failing(&self, url: &str) {
        self.route(url, Route { always_fail: true, ..Route::ok(b"") });
    }

    /// Fail `n` times, then serve a 200 response.
    pub fn fail_times(&self, url: &str, n: usize, body: &[u8]) {
        self.route(url, Route { failures_before_success: n, ..Route::ok(body) });
    }

    /// Serve a 200 response after a delay.
    pub fn with_delayed_page(&self, url: &str, body: &[u8], delay: Duration) {
        self.route(url, Route { delay, ..Route::ok(body) });
    }

    /// How many fetches hit the given URL exactly.
    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.as_str() == url).count()
    }

    /// Every fetched URL, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn fetch(&self, url: &Url, opts: FetchOptions) -> Result<NetworkResponse, Error> {
        self.calls.lock().unwrap().push(url.as_str().to_string());

        let route = {
            let mut routes = self.routes.lock().unwrap();
            let matched = routes
                .iter_mut()
                .filter(|(key, _)| url.as_str().starts_with(key.as_str()))
                .max_by_key(|(key, _)| key.len());
            match matched {
                None => return Err(Error::Network(format!("unreachable: {url}"))),
                Some((_, route)) => {
                    if route.always_fail {
                        return Err(Error::Network(format!("connection refused: {url}")));
                    }
                    if route.failures_before_success > 0 {
                        route.failures_before_success -= 1;
                        return Err(Error::Network(format!("connection refused: {url}")));
                    }
                    route.clone()
                }
            }
        };

        if !route.delay.is_zero() {
            tokio::time::sleep(route.delay).await;
        }

        Ok(NetworkResponse {
            url: url.clone(),
            status: if opts.no_cors { None } else { route.status },
            content_type: Some("text/html".to_string()),
            body: route.body,
        })
    }
}

/// In-memory store pair for strategy and replay tests.
pub(crate) async fn stores() -> (RecordStore, ContentCache) {
    let db = StoreDb::open_in_memory().await.unwrap();
    (RecordStore::new(db.clone(), "cache-index"), ContentCache::new(db))
}
