//! Offline-sync engine for a content-delivery client.
//!
//! This crate decides, for every outgoing request, whether to answer from
//! the durable cache, the network, or a fallback, and keeps the cache
//! consistent under eviction pressure and intermittent connectivity. It
//! provides the fetch strategies, the retry/replay queue, trigger dispatch,
//! and single-flight navigation on top of the stores in `offsync-core`.

pub mod context;
pub mod events;
pub mod nav;
pub mod normalize;
pub mod replay;
pub mod strategy;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use context::Context;
pub use events::{Dispatcher, Effect, Notification, Trigger};
pub use nav::{Document, NavEvent, NavOutcome, NavigationController};
pub use normalize::normalize;
pub use replay::{DrainReport, ReplayEngine};
pub use strategy::{ContentSource, FetchEngine, FetchedContent};
pub use transport::{FetchOptions, HttpTransport, NetworkResponse, Transport, TransportConfig};
