//! Offline-resilient request-interception cache for the network monitor
//! dashboard.
//!
//! A [`Worker`] sits between the dashboard page and the backend. It
//! installs a versioned cache of the dashboard shell, garbage-collects
//! older versions on activation, answers every intercepted request with a
//! per-class strategy, and forwards push messages as notifications.
//!
//! ```text
//! page request ──> Worker::fetch ──> classify ──┬─ Ignored ─> network
//!                                               ├─ Api ─────> network | offline JSON
//!                                               └─ Asset ───> network + cache write
//!                                                             | cache | shell | 503
//! push data ────> Worker::push ──> Notifier (kept alive until shown)
//! ```
//!
//! The network, the cache backend, the notification surface and the page
//! clients are all trait seams, so hosts and tests supply their own.

pub mod cache;
pub mod clients;
pub mod config;
pub mod error;
pub mod http;
pub mod keepalive;
pub mod lifecycle;
pub mod manifest;
pub mod network;
pub mod notify;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use cache::{Cache, CacheStorage, DiskStorage, MemoryStorage};
pub use clients::Clients;
pub use config::{NotificationConfig, OfflineConfig, DEFAULT_CACHE_VERSION};
pub use error::{OfflineError, Result};
pub use http::{Request, RequestKey, Response};
pub use keepalive::KeepAlive;
pub use lifecycle::{ActivationReport, LifecycleController, LifecycleState};
pub use manifest::AssetManifest;
pub use network::{HttpNetwork, Network};
pub use notify::{Notification, NotificationForwarder, Notifier, PushPayload};
pub use strategy::{classify, RequestClass, StrategyEngine};
pub use worker::{Worker, WorkerStatus};
