//! Push notification forwarding.
//!
//! Push data is decoded with a parse step that never fails: an absent,
//! malformed or wrongly-typed payload becomes the all-default payload.
//! Display and click handling log failures instead of returning them, so a
//! push can never take the host down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clients::Clients;
use crate::config::NotificationConfig;
use crate::error::Result;

/// Decoded push data. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl PushPayload {
    pub fn parse(data: Option<&[u8]>) -> Self {
        let data = match data {
            Some(data) if !data.is_empty() => data,
            _ => {
                debug!("Push event without data, using defaults");
                return Self::default();
            }
        };
        match serde_json::from_slice(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Malformed push payload, using defaults");
                Self::default()
            }
        }
    }
}

/// Unique identifier for a displayed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NotificationId(u64);

impl NotificationId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// Where a click on the notification navigates the page.
    pub url: String,
}

/// Platform surface that shows notifications to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show(&self, notification: &Notification) -> Result<()>;

    async fn close(&self, notification: &Notification) -> Result<()>;
}

pub struct NotificationForwarder {
    defaults: NotificationConfig,
    notifier: Arc<dyn Notifier>,
    clients: Arc<dyn Clients>,
}

/// Empty strings count as absent, like the dashboard's own `||` defaults.
fn or_default(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl NotificationForwarder {
    pub fn new(
        defaults: NotificationConfig,
        notifier: Arc<dyn Notifier>,
        clients: Arc<dyn Clients>,
    ) -> Self {
        Self {
            defaults,
            notifier,
            clients,
        }
    }

    pub fn build(&self, payload: PushPayload) -> Notification {
        Notification {
            id: NotificationId::new(),
            title: or_default(payload.title, &self.defaults.default_title),
            body: or_default(payload.body, &self.defaults.default_body),
            icon: self.defaults.icon.clone(),
            badge: self.defaults.badge.clone(),
            url: or_default(payload.url, &self.defaults.default_url),
        }
    }

    pub async fn display(&self, notification: &Notification) {
        match self.notifier.show(notification).await {
            Ok(()) => info!(id = ?notification.id, title = %notification.title, "Notification shown"),
            Err(e) => warn!(id = ?notification.id, error = %e, "Failed to show notification"),
        }
    }

    /// Handle a click: close the notification, then bring the page to its url.
    pub async fn activate(&self, notification: &Notification) {
        if let Err(e) = self.notifier.close(notification).await {
            warn!(id = ?notification.id, error = %e, "Failed to close notification");
        }
        match self.clients.open_window(&notification.url).await {
            Ok(()) => debug!(url = %notification.url, "Navigated client from notification"),
            Err(e) => warn!(url = %notification.url, error = %e, "Failed to open window"),
        }
    }
}
