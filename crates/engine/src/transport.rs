//! Network transport behind the fetch strategies.
//!
//! The strategies and replay engine only see the [`Transport`] trait, so
//! tests can substitute stub transports with scripted outcomes. The real
//! implementation wraps reqwest with the same client setup the rest of the
//! stack uses (rustls, compressed transfer, limited redirects, body cap).

use async_trait::async_trait;
use bytes::Bytes;
use offsync_core::Error;
use reqwest::{Client, header};
use std::time::Duration;
use url::Url;

/// Per-request fetch options.
///
/// `no_cors` marks a cross-origin asset request whose response status is
/// opaque to the client; such responses cache unconditionally. Credential
/// policy is owned by the transport itself (cookie jar on the client), not
/// set per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    pub no_cors: bool,
}

impl FetchOptions {
    pub fn no_cors() -> Self {
        Self { no_cors: true }
    }
}

/// Response from a transport fetch.
///
/// `status` is `None` for opaque responses. Connection-level failures
/// (offline, DNS, timeout) surface as `Err`; an HTTP error status is still
/// an `Ok` response, and callers decide whether it counts as success.
#[derive(Debug, Clone)]
pub struct NetworkResponse {
    pub url: Url,
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl NetworkResponse {
    /// Whether a strategy may write this response into the cache.
    /// Opaque responses have no status to check and are cacheable.
    pub fn is_cacheable(&self) -> bool {
        match self.status {
            None => true,
            Some(status) => (200..300).contains(&status),
        }
    }
}

/// Abstract network fetch.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &Url, opts: FetchOptions) -> Result<NetworkResponse, Error>;
}

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// User agent string (default: "offsync/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_body_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: "offsync/0.1".to_string(),
            max_body_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20_000),
            max_redirects: 5,
        }
    }
}

impl TransportConfig {
    /// Derive transport settings from the application config.
    pub fn from_app_config(config: &offsync_core::AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_body_bytes: config.max_body_bytes,
            timeout: config.timeout(),
            max_redirects: 5,
        }
    }
}

/// HTTP transport backed by reqwest.
pub struct HttpTransport {
    http: Client,
    config: TransportConfig,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given configuration.
    pub fn new(config: TransportConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &Url, opts: FetchOptions) -> Result<NetworkResponse, Error> {
        let response = self
            .http
            .get(url.as_str())
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|e| Error::Network(format!("network error: {e}")))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {e}")))?;

        if body.len() > self.config.max_body_bytes {
            return Err(Error::Network(format!(
                "{} bytes exceeds {}",
                body.len(),
                self.config.max_body_bytes
            )));
        }

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        tracing::debug!("fetched {} -> {} ({} bytes)", url, status, body.len());

        Ok(NetworkResponse {
            url: url.clone(),
            // no-cors responses are opaque; the status is not visible to us
            status: if opts.no_cors { None } else { Some(status) },
            content_type,
            body,
        })
    }
}
