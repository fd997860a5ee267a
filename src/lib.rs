//! wildcard-worker - an offline cache and notification worker for the MLB
//! Wild Card standings app.
//!
//! The worker handles six host lifecycle events against one named cache
//! bucket. Every host facility (cache storage, network, notifications,
//! window clients, clock) sits behind a trait so the handlers run the same
//! under the bundled HTTP host and under test doubles.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wildcard_worker::{
//!     Event, HttpNetwork, LoggingClients, MemoryCacheStorage, NetworkConfig,
//!     NotificationCenter, ServiceWorker, WorkerConfig,
//! };
//!
//! # async fn example() -> wildcard_worker::Result<()> {
//! let worker = ServiceWorker::new(
//!     WorkerConfig::default(),
//!     Arc::new(MemoryCacheStorage::new()),
//!     Arc::new(HttpNetwork::new(&NetworkConfig::default())?),
//!     Arc::new(NotificationCenter::new()),
//!     Arc::new(LoggingClients::new()),
//! );
//!
//! worker.dispatch(Event::Install).await?;
//! let outcome = worker.sync("background-sync").await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

#[cfg(feature = "server")]
pub mod api;
pub mod cache;
pub mod clients;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod network;
pub mod notification;
pub mod worker;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use cache::{CacheStorage, CachedResponse, DiskCacheStorage, MemoryCacheStorage};
pub use clients::{Clients, LoggingClients};
pub use clock::{Clock, FixedClock, NotifyZone, SystemClock};
pub use config::{ApiConfig, AppConfig, CacheConfig, NetworkConfig, WorkerConfig};
pub use error::{Error, Result};
pub use event::{
    ClickEvent, ClickOutcome, Event, EventKind, EventOutcome, InstallReport, PushEvent,
    SyncOutcome, SyncReport,
};
pub use network::{HttpNetwork, Network, Request, Response};
pub use notification::{Action, Notification, NotificationCenter, Notifier};
pub use worker::{ServiceWorker, Source};
