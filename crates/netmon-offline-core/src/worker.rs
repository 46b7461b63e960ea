//! The background context hosting the offline cache.
//!
//! `Worker` wires the lifecycle controller, the strategy engine and the
//! notification forwarder to their seams and exposes one entry point per
//! event. Events may run concurrently; nothing here serializes them.

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::cache::CacheStorage;
use crate::clients::Clients;
use crate::config::OfflineConfig;
use crate::error::{OfflineError, Result};
use crate::http::{Request, Response};
use crate::keepalive::KeepAlive;
use crate::lifecycle::{ActivationReport, LifecycleController, LifecycleState};
use crate::network::Network;
use crate::notify::{Notification, NotificationForwarder, Notifier, PushPayload};
use crate::strategy::StrategyEngine;

/// Point-in-time view of the worker and its store.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub version: String,
    pub state: LifecycleState,
    /// Every version present in the store, current one included.
    pub stored_versions: Vec<String>,
    /// Entries in the current version.
    pub entries: usize,
    pub pending_tasks: usize,
}

pub struct Worker {
    config: Arc<OfflineConfig>,
    origin: Url,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    lifecycle: LifecycleController,
    strategy: StrategyEngine,
    forwarder: Arc<NotificationForwarder>,
    keep_alive: KeepAlive,
}

impl Worker {
    pub fn new(
        config: OfflineConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        notifier: Arc<dyn Notifier>,
        clients: Arc<dyn Clients>,
    ) -> Result<Self> {
        let lifecycle = LifecycleController::new(
            &config,
            Arc::clone(&storage),
            Arc::clone(&network),
            Arc::clone(&clients),
        )?;
        let strategy = StrategyEngine::new(&config, Arc::clone(&storage), Arc::clone(&network))?;
        let forwarder = Arc::new(NotificationForwarder::new(
            config.notifications.clone(),
            notifier,
            clients,
        ));
        Ok(Self {
            origin: config.origin_url()?,
            config: Arc::new(config),
            storage,
            network,
            lifecycle,
            strategy,
            forwarder,
            keep_alive: KeepAlive::new(),
        })
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Build a request for a path on the configured origin.
    pub fn request(&self, method: Method, path: &str) -> Result<Request> {
        let url = self
            .origin
            .join(path)
            .map_err(|e| OfflineError::InvalidRequest(format!("{}: {}", path, e)))?;
        Ok(Request::new(method, url))
    }

    pub async fn install(&self) -> Result<()> {
        self.lifecycle.install().await
    }

    pub async fn activate(&self) -> Result<ActivationReport> {
        self.lifecycle.activate().await
    }

    /// Resume a version a previous run installed, as active only if that
    /// run also activated it.
    pub async fn restore(&self) -> Result<LifecycleState> {
        self.lifecycle.restore().await
    }

    /// Install, then activate at once if the install asked to skip waiting.
    /// Returns `None` when the version is left waiting.
    pub async fn start(&self) -> Result<Option<ActivationReport>> {
        self.install().await?;
        if self.lifecycle.skip_waiting_requested() {
            Ok(Some(self.activate().await?))
        } else {
            Ok(None)
        }
    }

    /// Answer a request issued by the page.
    ///
    /// Until the version is active the worker does not control the page, so
    /// requests go straight to the network.
    pub async fn fetch(&self, request: Request) -> Result<Response> {
        if !self.lifecycle.is_active() {
            debug!(url = %request.url, state = ?self.lifecycle.state(), "Not controlling yet, passing through");
            return self.network.fetch(&request).await;
        }
        self.strategy.handle(&request, &self.keep_alive).await
    }

    /// Handle a push event. The display is kept alive past this call.
    pub fn push(&self, data: Option<&[u8]>) -> Notification {
        let notification = self.forwarder.build(PushPayload::parse(data));
        let forwarder = Arc::clone(&self.forwarder);
        let shown = notification.clone();
        self.keep_alive.wait_until("push", async move {
            forwarder.display(&shown).await;
        });
        notification
    }

    /// Handle a click on a displayed notification.
    pub fn notification_click(&self, notification: &Notification) {
        let forwarder = Arc::clone(&self.forwarder);
        let clicked = notification.clone();
        self.keep_alive.wait_until("notification-click", async move {
            forwarder.activate(&clicked).await;
        });
    }

    /// Wait for all detached work (cache writes, notification display).
    pub async fn settle(&self) -> usize {
        self.keep_alive.settle().await
    }

    pub fn pending(&self) -> usize {
        self.keep_alive.pending()
    }

    pub async fn status(&self) -> Result<WorkerStatus> {
        let version = self.lifecycle.version().to_string();
        let stored_versions = self.storage.keys().await?;
        let entries = self.storage.entry_keys(&version).await?.len();
        Ok(WorkerStatus {
            version,
            state: self.lifecycle.state(),
            stored_versions,
            entries,
            pending_tasks: self.keep_alive.pending(),
        })
    }
}
