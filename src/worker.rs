//! The service worker: one handler per host lifecycle event.

use std::sync::Arc;

use bytes::Bytes;

use crate::cache::{CacheStorage, CachedResponse};
use crate::clients::Clients;
use crate::clock::{Clock, SystemClock};
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::event::{
    BACKGROUND_SYNC_TAG, ClickEvent, ClickOutcome, Event, EventOutcome, InstallReport,
    PERIODIC_SYNC_TAG, PushEvent, SyncOutcome, SyncReport,
};
use crate::network::{Network, Request, Response};
use crate::notification::{Action, Notification, Notifier};

/// Where a fetch was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A stored entry matched.
    Cache,
    /// The request went to the network.
    Network,
}

impl Source {
    /// Lower-case label, used in response headers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "hit",
            Self::Network => "miss",
        }
    }
}

/// Handles host events against a single cache bucket.
///
/// All handlers read the bucket name from the shared [`WorkerConfig`], so
/// install, fetch and sync always address the same bucket.
#[derive(Clone)]
pub struct ServiceWorker {
    config: Arc<WorkerConfig>,
    caches: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    notifier: Arc<dyn Notifier>,
    clients: Arc<dyn Clients>,
    clock: Arc<dyn Clock>,
}

impl ServiceWorker {
    /// Creates a worker using the system clock.
    #[must_use]
    pub fn new(
        config: WorkerConfig,
        caches: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        notifier: Arc<dyn Notifier>,
        clients: Arc<dyn Clients>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            caches,
            network,
            notifier,
            clients,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the worker configuration.
    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Routes an event to its handler.
    ///
    /// # Errors
    ///
    /// Propagates handler errors. Sync events never fail here; their
    /// failures are reported inside [`SyncOutcome`].
    pub async fn dispatch(&self, event: Event) -> Result<EventOutcome> {
        log::debug!("Dispatching {} event", event.kind());
        match event {
            Event::Install => self.install().await.map(EventOutcome::Installed),
            Event::Fetch(request) => self.fetch(&request).await.map(EventOutcome::Responded),
            Event::Push(push) => self.push(push).await.map(EventOutcome::Notified),
            Event::NotificationClick(click) => self
                .notification_click(click)
                .await
                .map(EventOutcome::Clicked),
            Event::Sync { tag } => Ok(EventOutcome::Synced(self.sync(&tag).await)),
            Event::PeriodicSync { tag } => Ok(EventOutcome::Synced(self.periodic_sync(&tag).await)),
        }
    }

    /// Fetches every precache path and stores them in the bucket.
    ///
    /// Nothing is written unless every path fetched successfully.
    ///
    /// # Errors
    ///
    /// Returns the first transport error or non-success status, or a cache
    /// write error.
    pub async fn install(&self) -> Result<InstallReport> {
        let bucket = &self.config.cache_name;
        self.caches.open(bucket).await?;

        let responses = futures::future::try_join_all(
            self.config
                .precache
                .iter()
                .map(|path| self.fetch_ok(Request::get(path))),
        )
        .await?;

        let stored_at = self.clock.now();
        let entries: Vec<_> = self
            .config
            .precache
            .iter()
            .cloned()
            .zip(
                responses
                    .into_iter()
                    .map(|r| CachedResponse::from_response(r, stored_at)),
            )
            .collect();
        self.caches.put_all(bucket, entries).await?;

        log::info!(
            "Installed: cached {} resources in {bucket}",
            self.config.precache.len()
        );
        Ok(InstallReport {
            cache_name: bucket.clone(),
            cached: self.config.precache.clone(),
        })
    }

    /// Answers a page request from the cache, falling back to the network.
    ///
    /// # Errors
    ///
    /// Returns the network error when the request misses the cache and the
    /// network fetch fails.
    pub async fn fetch(&self, request: &Request) -> Result<Response> {
        self.fetch_with_source(request).await.map(|(resp, _)| resp)
    }

    /// Like [`fetch`](Self::fetch), also reporting where the answer came from.
    ///
    /// # Errors
    ///
    /// See [`fetch`](Self::fetch).
    pub async fn fetch_with_source(&self, request: &Request) -> Result<(Response, Source)> {
        if request.is_cacheable() {
            match self
                .caches
                .match_key(&self.config.cache_name, &request.url)
                .await
            {
                Ok(Some(hit)) => return Ok((hit.into_response(), Source::Cache)),
                Ok(None) => {}
                Err(e) => log::warn!("Cache lookup for {} failed: {e}", request.url),
            }
        }
        let response = self.network.fetch(request).await?;
        Ok((response, Source::Network))
    }

    /// Shows the notification for a push message.
    ///
    /// # Errors
    ///
    /// Returns an error if the host refuses to display it.
    pub async fn push(&self, event: PushEvent) -> Result<Notification> {
        let notification =
            Notification::push(&self.config, event.text.as_deref(), self.clock.now());
        self.notifier.show(notification.clone()).await?;
        Ok(notification)
    }

    /// Closes the clicked notification and routes on the chosen action.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification cannot be closed or the window
    /// cannot be opened.
    pub async fn notification_click(&self, event: ClickEvent) -> Result<ClickOutcome> {
        self.notifier.close(&event.tag).await?;

        match Action::parse(event.action.as_deref()) {
            Action::Close => Ok(ClickOutcome::Dismissed),
            action @ (Action::Explore | Action::Default) => {
                let url = self.config.app_url.clone();
                self.clients.open_window(&url).await?;
                Ok(ClickOutcome::Opened { action, url })
            }
        }
    }

    /// Handles a one-shot sync event.
    pub async fn sync(&self, tag: &str) -> SyncOutcome {
        if tag != BACKGROUND_SYNC_TAG {
            log::debug!("Ignoring sync tag {tag}");
            return SyncOutcome::Ignored;
        }
        self.sync_best_effort().await
    }

    /// Handles a periodic sync event.
    pub async fn periodic_sync(&self, tag: &str) -> SyncOutcome {
        if tag != PERIODIC_SYNC_TAG {
            log::debug!("Ignoring periodic sync tag {tag}");
            return SyncOutcome::Ignored;
        }
        self.sync_best_effort().await
    }

    async fn sync_best_effort(&self) -> SyncOutcome {
        match self.run_sync().await {
            Ok(report) => SyncOutcome::Completed(report),
            Err(e) => {
                log::error!("Background sync failed: {e}");
                SyncOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Refreshes the cached data document and, at the configured hour,
    /// shows the daily notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails, the document is not JSON, the
    /// cache write fails, or the notification cannot be shown. A fetch or
    /// parse failure leaves the cache untouched.
    pub async fn run_sync(&self) -> Result<SyncReport> {
        let data_path = &self.config.data_path;
        let response = self.fetch_ok(Request::get(data_path)).await?;

        let document: serde_json::Value = serde_json::from_slice(&response.body)?;
        let body = Bytes::from(serde_json::to_vec(&document)?);
        let bytes = body.len();

        let now = self.clock.now();
        self.caches
            .put(
                &self.config.cache_name,
                data_path,
                CachedResponse {
                    url: data_path.clone(),
                    status: 200,
                    content_type: Some("application/json".to_string()),
                    headers: Vec::new(),
                    body,
                    stored_at: now,
                },
            )
            .await?;
        log::info!("Refreshed {data_path} ({bytes} bytes)");

        let daily_notification = self.config.notify_zone.hour(now) == self.config.notify_hour;
        if daily_notification {
            self.notifier
                .show(Notification::daily(&self.config))
                .await?;
        }

        Ok(SyncReport {
            data_path: data_path.clone(),
            bytes,
            daily_notification,
        })
    }

    /// Fetches from the network, treating non-success statuses as errors.
    async fn fetch_ok(&self, request: Request) -> Result<Response> {
        let response = self.network.fetch(&request).await?;
        if !response.is_success() {
            return Err(Error::Status {
                url: request.url,
                status: response.status,
            });
        }
        Ok(response)
    }
}
