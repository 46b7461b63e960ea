//! Terminal stand-ins for the page and the platform: notifications and
//! navigations are printed instead of shown.

use async_trait::async_trait;
use netmon_offline_core::{
    Clients, Network, Notification, Notifier, OfflineError, Request, Response, Result,
};
use tracing::debug;

pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn show(&self, notification: &Notification) -> Result<()> {
        println!("[notification] {}", notification.title);
        println!("  {}", notification.body);
        println!("  icon: {}  badge: {}", notification.icon, notification.badge);
        println!("  opens: {}", notification.url);
        Ok(())
    }

    async fn close(&self, notification: &Notification) -> Result<()> {
        debug!(id = ?notification.id, "Notification closed");
        Ok(())
    }
}

pub struct ConsoleClients {
    pub origin: String,
}

#[async_trait]
impl Clients for ConsoleClients {
    async fn claim(&self) -> Result<()> {
        debug!(origin = %self.origin, "Claimed clients");
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        println!("[navigate] {}", url);
        Ok(())
    }
}

/// A network that is never reachable, for `--offline`.
pub struct Disconnected;

#[async_trait]
impl Network for Disconnected {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        Err(OfflineError::Unreachable(format!("offline: {}", request.url)))
    }
}
