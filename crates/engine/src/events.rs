//! Trigger dispatch for connectivity, sync, and push events.
//!
//! Event-driven callback registration becomes an explicit dispatch table:
//! the runtime hands opaque triggers to [`Dispatcher::dispatch`], which
//! routes them by kind and tag payload and returns the resulting effect.
//! Handlers stay pure functions of (event, context), so tests drive them
//! without a live runtime.

use offsync_core::Error;
use serde::Deserialize;
use std::sync::Arc;

use crate::nav::parse_title;
use crate::replay::{DrainReport, ReplayEngine};
use crate::strategy::FetchEngine;
use crate::transport::{FetchOptions, Transport};

/// An external trigger event with its optional payload.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Connectivity came back; queued operations can replay.
    ConnectivityRestored,
    /// A scheduled/background-sync signal. The tag selects the operation
    /// class: `analytics`, or `notifyarticle:<path>`.
    Sync { tag: String },
    /// A push message arrived; the latest-article descriptor tells us what
    /// to precache and announce.
    Push,
}

/// What a dispatched trigger did.
#[derive(Debug, Clone)]
pub enum Effect {
    Drained(DrainReport),
    NotificationReady(Notification),
    Ignored,
}

/// Data needed to show a notification for a freshly cached article.
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub icon: String,
    pub url: String,
}

/// Routes trigger events to the replay and fetch engines.
pub struct Dispatcher {
    replay: ReplayEngine,
    engine: FetchEngine,
    transport: Arc<dyn Transport>,
    latest_article_key: String,
}

impl Dispatcher {
    pub fn new(
        replay: ReplayEngine,
        engine: FetchEngine,
        transport: Arc<dyn Transport>,
        latest_article_key: impl Into<String>,
    ) -> Self {
        Self { replay, engine, transport, latest_article_key: latest_article_key.into() }
    }

    /// Handle one trigger event.
    pub async fn dispatch(&self, trigger: Trigger) -> Result<Effect, Error> {
        match trigger {
            Trigger::ConnectivityRestored => Ok(Effect::Drained(self.replay.drain().await?)),
            Trigger::Sync { tag } => self.handle_sync(&tag).await,
            Trigger::Push => self.handle_push().await,
        }
    }

    async fn handle_sync(&self, tag: &str) -> Result<Effect, Error> {
        let (name, payload) = match tag.split_once(':') {
            Some((name, payload)) => (name, Some(payload)),
            None => (tag, None),
        };

        match (name, payload) {
            ("analytics", _) => {
                tracing::debug!("sync trigger: analytics");
                Ok(Effect::Drained(self.replay.drain().await?))
            }
            ("notifyarticle", Some(path)) => {
                tracing::debug!("sync trigger: notifyarticle {path}");
                let content = self.engine.fetch_and_cache(path).await?;
                let title = parse_title(&content.body)
                    .unwrap_or_else(|| "Your article is ready!".to_string());
                Ok(Effect::NotificationReady(Notification {
                    title,
                    body: String::new(),
                    icon: String::new(),
                    url: content.key,
                }))
            }
            _ => {
                tracing::debug!("ignoring unknown sync tag: {tag}");
                Ok(Effect::Ignored)
            }
        }
    }

    /// Push messages carry no payload; the latest-article endpoint is
    /// fetched for the notification data, and the article itself is cached
    /// before the notification is announced.
    async fn handle_push(&self) -> Result<Effect, Error> {
        let descriptor_url = self.engine.key_for(&self.latest_article_key)?;
        let response = self.transport.fetch(&descriptor_url, FetchOptions::default()).await?;

        let notification: Notification = serde_json::from_slice(&response.body)
            .map_err(|e| Error::InvalidInput(format!("article descriptor: {e}")))?;

        self.engine.cache_first(&notification.url).await?;

        Ok(Effect::NotificationReady(notification))
    }
}
