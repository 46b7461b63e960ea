//! Install / activate protocol for one cache version.
//!
//! ```text
//! Uninstalled -> Installing -> Installed (waiting) -> Activating -> Active
//! ```
//!
//! Install is all-or-nothing: every manifest asset is fetched before any
//! of them is written, so a failed install never leaves a half-populated
//! version behind. A failed install stays `Installed` without requesting
//! skip-waiting and is never promoted. Re-installing an active version
//! keeps it active throughout, whatever the outcome.
//!
//! Activation deletes every other stored version, each deletion
//! independently, records the version as activated in the store, then
//! claims the clients.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{join_all, try_join_all};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::{Cache, CacheStorage};
use crate::clients::Clients;
use crate::config::OfflineConfig;
use crate::error::{OfflineError, Result};
use crate::http::{Request, RequestKey, Response};
use crate::manifest::AssetManifest;
use crate::network::Network;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    Uninstalled,
    Installing,
    /// Installed and waiting for activation.
    Installed,
    Activating,
    Active,
}

impl LifecycleState {
    pub fn display_name(&self) -> &'static str {
        match self {
            LifecycleState::Uninstalled => "uninstalled",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed (waiting)",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
        }
    }
}

/// Outcome of an activation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Stale versions removed.
    pub deleted: Vec<String>,
    /// Stale versions that could not be removed.
    pub failed: Vec<String>,
    pub claimed: bool,
}

#[derive(Debug)]
struct Status {
    state: LifecycleState,
    installed: bool,
    skip_waiting: bool,
}

pub struct LifecycleController {
    version: String,
    origin: Url,
    manifest: AssetManifest,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    clients: Arc<dyn Clients>,
    status: Mutex<Status>,
}

impl LifecycleController {
    pub fn new(
        config: &OfflineConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        clients: Arc<dyn Clients>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            version: config.cache_version.clone(),
            origin: config.origin_url()?,
            manifest: config.manifest()?,
            storage,
            network,
            clients,
            status: Mutex::new(Status {
                state: LifecycleState::Uninstalled,
                installed: false,
                skip_waiting: false,
            }),
        })
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn state(&self) -> LifecycleState {
        self.status().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Active
    }

    /// Whether the last install asked to be activated without waiting.
    pub fn skip_waiting_requested(&self) -> bool {
        self.status().skip_waiting
    }

    /// Populate the current version with every manifest asset.
    pub async fn install(&self) -> Result<()> {
        let was_active = {
            let mut status = self.status();
            if status.state != LifecycleState::Active {
                status.state = LifecycleState::Installing;
            }
            status.state == LifecycleState::Active
        };
        info!(version = %self.version, assets = self.manifest.len(), was_active, "Installing cache version");

        let result = self.populate().await;

        let mut status = self.status();
        if !was_active {
            status.state = LifecycleState::Installed;
        }
        match result {
            Ok(count) => {
                status.installed = true;
                status.skip_waiting = true;
                info!(version = %self.version, entries = count, "Cache version installed");
                Ok(())
            }
            Err(e) => {
                status.installed = false;
                status.skip_waiting = false;
                error!(version = %self.version, error = %e, "Install failed");
                Err(e)
            }
        }
    }

    async fn populate(&self) -> Result<usize> {
        let existed = self.storage.has(&self.version).await?;
        let cache = Cache::open(Arc::clone(&self.storage), &self.version).await?;

        let result = self.fetch_and_store(&cache).await;
        if result.is_err() && !existed {
            // Leave no trace of a version this attempt created.
            if let Err(e) = self.storage.delete(&self.version).await {
                warn!(version = %self.version, error = %e, "Failed to discard incomplete version");
            }
        }
        result
    }

    async fn fetch_and_store(&self, cache: &Cache) -> Result<usize> {
        let fetched = try_join_all(
            self.manifest
                .entries()
                .iter()
                .map(|path| self.fetch_asset(path)),
        )
        .await?;

        for (key, response) in &fetched {
            cache.put(key, response).await?;
        }
        Ok(fetched.len())
    }

    async fn fetch_asset(&self, path: &str) -> Result<(RequestKey, Response)> {
        let install_failed = |reason: String| OfflineError::InstallFailed {
            version: self.version.clone(),
            asset: path.to_string(),
            reason,
        };

        let request = self
            .asset_request(path)
            .map_err(|e| install_failed(e.to_string()))?;
        let key = RequestKey::for_request(&request, &self.origin);

        let response = self
            .network
            .fetch(&request)
            .await
            .map_err(|e| install_failed(e.to_string()))?;
        if !response.is_success() {
            return Err(install_failed(format!("status {}", response.status)));
        }
        debug!(asset = path, bytes = response.body.len(), "Fetched manifest asset");
        Ok((key, response))
    }

    fn asset_request(&self, path: &str) -> std::result::Result<Request, url::ParseError> {
        Ok(Request::get(self.origin.join(path)?))
    }

    /// Pick up the current version from a store a previous host filled.
    ///
    /// A version holding every manifest entry resumes as `Active` when the
    /// store records it as activated, and as `Installed` (waiting) when it
    /// was only installed. Anything else leaves the state untouched. Nothing
    /// is fetched. Returns the resulting state.
    pub async fn restore(&self) -> Result<LifecycleState> {
        let current = self.state();
        if current == LifecycleState::Active || !self.storage.has(&self.version).await? {
            return Ok(current);
        }
        let stored = self.storage.entry_keys(&self.version).await?;
        let missing = self
            .manifest
            .entries()
            .iter()
            .filter(|path| match self.asset_request(path) {
                Ok(request) => !stored.contains(&RequestKey::for_request(&request, &self.origin)),
                Err(_) => true,
            })
            .count();
        if missing > 0 {
            debug!(version = %self.version, missing, "Stored version incomplete, not restoring");
            return Ok(current);
        }
        let activated = self.storage.activated().await?.as_deref() == Some(self.version.as_str());

        let mut status = self.status();
        status.installed = true;
        status.skip_waiting = false;
        status.state = if activated {
            LifecycleState::Active
        } else {
            LifecycleState::Installed
        };
        info!(
            version = %self.version,
            entries = stored.len(),
            state = status.state.display_name(),
            "Restored cache version"
        );
        Ok(status.state)
    }

    /// Remove stale versions and take control of the clients.
    pub async fn activate(&self) -> Result<ActivationReport> {
        {
            let mut status = self.status();
            if !status.installed {
                return Err(OfflineError::NotInstalled(self.version.clone()));
            }
            status.state = LifecycleState::Activating;
        }
        info!(version = %self.version, "Activating cache version");

        let names = match self.storage.keys().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate cache versions, skipping cleanup");
                Vec::new()
            }
        };

        let stale: Vec<String> = names.into_iter().filter(|n| n != &self.version).collect();
        let results = join_all(stale.into_iter().map(|name| async move {
            let result = self.storage.delete(&name).await;
            (name, result)
        }))
        .await;

        let mut report = ActivationReport::default();
        for (name, result) in results {
            match result {
                Ok(_) => {
                    info!(cache = %name, "Removed stale cache version");
                    report.deleted.push(name);
                }
                Err(e) => {
                    warn!(cache = %name, error = %e, "Failed to remove stale cache version");
                    report.failed.push(name);
                }
            }
        }

        if let Err(e) = self.storage.mark_activated(&self.version).await {
            warn!(version = %self.version, error = %e, "Failed to record activated version");
        }

        match self.clients.claim().await {
            Ok(()) => report.claimed = true,
            Err(e) => warn!(error = %e, "Failed to claim clients"),
        }

        let mut status = self.status();
        status.state = LifecycleState::Active;
        status.skip_waiting = false;
        info!(
            version = %self.version,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Cache version active"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStorage;
    use crate::test_support::{RecordingClients, ScriptedNetwork, StubbornStorage, ORIGIN};

    fn config(version: &str, assets: &[&str]) -> OfflineConfig {
        OfflineConfig {
            origin: ORIGIN.to_string(),
            cache_version: version.to_string(),
            assets: assets.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn network_with_shell() -> Arc<ScriptedNetwork> {
        let network = Arc::new(ScriptedNetwork::new());
        network.route("/", Response::ok("<html>shell</html>"));
        network.route("/static/css/styles.css", Response::ok("body {}"));
        network
    }

    fn controller(
        version: &str,
        assets: &[&str],
        storage: Arc<dyn CacheStorage>,
        network: Arc<ScriptedNetwork>,
        clients: Arc<RecordingClients>,
    ) -> LifecycleController {
        LifecycleController::new(&config(version, assets), storage, network, clients).unwrap()
    }

    #[tokio::test]
    async fn test_install_populates_manifest() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let lifecycle = controller(
            "v1",
            &["/", "/static/css/styles.css"],
            Arc::clone(&storage),
            network_with_shell(),
            Arc::new(RecordingClients::default()),
        );
        assert_eq!(lifecycle.state(), LifecycleState::Uninstalled);

        lifecycle.install().await.unwrap();

        assert_eq!(lifecycle.state(), LifecycleState::Installed);
        assert!(lifecycle.skip_waiting_requested());
        assert_eq!(
            storage.entry_keys("v1").await.unwrap(),
            vec![RequestKey::get("/"), RequestKey::get("/static/css/styles.css")]
        );
    }

    #[tokio::test]
    async fn test_install_twice_is_idempotent() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let lifecycle = controller(
            "v1",
            &["/", "/static/css/styles.css"],
            Arc::clone(&storage),
            network_with_shell(),
            Arc::new(RecordingClients::default()),
        );

        lifecycle.install().await.unwrap();
        let first = storage.entry_keys("v1").await.unwrap();
        lifecycle.install().await.unwrap();

        assert_eq!(storage.entry_keys("v1").await.unwrap(), first);
        assert_eq!(storage.keys().await.unwrap(), vec!["v1".to_string()]);
    }

    #[tokio::test]
    async fn test_install_fails_whole_on_one_missing_asset() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let lifecycle = controller(
            "v2",
            &["/", "/static/js/missing.js"],
            Arc::clone(&storage),
            network_with_shell(),
            Arc::new(RecordingClients::default()),
        );

        let err = lifecycle.install().await.unwrap_err();
        match err {
            OfflineError::InstallFailed { asset, .. } => assert_eq!(asset, "/static/js/missing.js"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(lifecycle.state(), LifecycleState::Installed);
        assert!(!lifecycle.skip_waiting_requested());
        assert!(!storage.has("v2").await.unwrap());

        assert!(matches!(
            lifecycle.activate().await,
            Err(OfflineError::NotInstalled(_))
        ));
        assert_eq!(lifecycle.state(), LifecycleState::Installed);
    }

    #[tokio::test]
    async fn test_failed_install_leaves_previous_version() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = network_with_shell();
        let clients = Arc::new(RecordingClients::default());

        let v1 = controller("v1", &["/"], Arc::clone(&storage), network.clone(), clients.clone());
        v1.install().await.unwrap();
        v1.activate().await.unwrap();

        network.set_online(false);
        let v2 = controller("v2", &["/"], Arc::clone(&storage), network.clone(), clients);
        assert!(v2.install().await.is_err());

        assert_eq!(storage.keys().await.unwrap(), vec!["v1".to_string()]);
        assert!(storage
            .match_request("v1", &RequestKey::get("/"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_activate_removes_stale_versions_and_claims() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        storage.open("network-monitor-cache-v0").await.unwrap();
        storage.open("other-app-cache").await.unwrap();
        let clients = Arc::new(RecordingClients::default());

        let lifecycle = controller(
            "network-monitor-cache-v1",
            &["/"],
            Arc::clone(&storage),
            network_with_shell(),
            clients.clone(),
        );
        lifecycle.install().await.unwrap();
        let report = lifecycle.activate().await.unwrap();

        assert!(lifecycle.is_active());
        assert!(!lifecycle.skip_waiting_requested());
        assert!(report.claimed);
        assert_eq!(clients.claims(), 1);
        assert_eq!(report.deleted.len(), 2);
        assert!(report.failed.is_empty());
        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["network-monitor-cache-v1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_stale_deletion_failure_does_not_block_activation() {
        let storage: Arc<dyn CacheStorage> = Arc::new(StubbornStorage::new("v0-locked"));
        storage.open("v0-locked").await.unwrap();
        storage.open("v0").await.unwrap();
        let clients = Arc::new(RecordingClients::default());

        let lifecycle = controller("v1", &["/"], Arc::clone(&storage), network_with_shell(), clients.clone());
        lifecycle.install().await.unwrap();
        let report = lifecycle.activate().await.unwrap();

        assert!(lifecycle.is_active());
        assert_eq!(report.deleted, vec!["v0".to_string()]);
        assert_eq!(report.failed, vec!["v0-locked".to_string()]);
        assert_eq!(clients.claims(), 1);
    }

    #[tokio::test]
    async fn test_claim_failure_still_activates() {
        let lifecycle = controller(
            "v1",
            &["/"],
            Arc::new(MemoryStorage::new()),
            network_with_shell(),
            Arc::new(RecordingClients::failing_claim()),
        );
        lifecycle.install().await.unwrap();
        let report = lifecycle.activate().await.unwrap();

        assert!(!report.claimed);
        assert!(lifecycle.is_active());
    }

    #[tokio::test]
    async fn test_restore_complete_version() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = network_with_shell();
        let clients = Arc::new(RecordingClients::default());
        let assets = ["/", "/static/css/styles.css"];

        let first = controller("v1", &assets, Arc::clone(&storage), network.clone(), clients.clone());
        first.install().await.unwrap();
        first.activate().await.unwrap();

        network.set_online(false);
        let restarted = controller("v1", &assets, Arc::clone(&storage), network.clone(), clients);
        assert_eq!(restarted.restore().await.unwrap(), LifecycleState::Active);
        assert!(restarted.is_active());
        assert_eq!(network.requests().len(), assets.len());
    }

    #[tokio::test]
    async fn test_restore_installed_only_version_waits() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        storage.open("v0").await.unwrap();
        let clients = Arc::new(RecordingClients::default());

        let first = controller("v1", &["/"], Arc::clone(&storage), network_with_shell(), clients.clone());
        first.install().await.unwrap();

        let restarted = controller("v1", &["/"], Arc::clone(&storage), network_with_shell(), clients.clone());
        assert_eq!(restarted.restore().await.unwrap(), LifecycleState::Installed);
        assert!(!restarted.is_active());
        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["v0".to_string(), "v1".to_string()]
        );

        let report = restarted.activate().await.unwrap();
        assert_eq!(report.deleted, vec!["v0".to_string()]);
        assert_eq!(clients.claims(), 1);
        assert_eq!(storage.activated().await.unwrap(), Some("v1".to_string()));
    }

    #[tokio::test]
    async fn test_restore_matches_normalized_manifest_paths() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = network_with_shell();
        let clients = Arc::new(RecordingClients::default());
        let assets = ["/", "/static/./css/styles.css"];

        let first = controller("v1", &assets, Arc::clone(&storage), network.clone(), clients.clone());
        first.install().await.unwrap();
        first.activate().await.unwrap();
        assert!(storage
            .entry_keys("v1")
            .await
            .unwrap()
            .contains(&RequestKey::get("/static/css/styles.css")));

        let restarted = controller("v1", &assets, Arc::clone(&storage), network, clients);
        assert_eq!(restarted.restore().await.unwrap(), LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_reinstall_of_active_version_stays_active_on_failure() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = network_with_shell();
        let lifecycle = controller(
            "v1",
            &["/"],
            Arc::clone(&storage),
            network.clone(),
            Arc::new(RecordingClients::default()),
        );
        lifecycle.install().await.unwrap();
        lifecycle.activate().await.unwrap();

        network.set_online(false);
        assert!(lifecycle.install().await.is_err());

        assert!(lifecycle.is_active());
        assert!(!lifecycle.skip_waiting_requested());
        assert!(storage
            .match_request("v1", &RequestKey::get("/"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_failed_reinstall_is_never_promoted() {
        let network = network_with_shell();
        let lifecycle = controller(
            "v1",
            &["/"],
            Arc::new(MemoryStorage::new()),
            network.clone(),
            Arc::new(RecordingClients::default()),
        );
        lifecycle.install().await.unwrap();

        network.set_online(false);
        assert!(lifecycle.install().await.is_err());

        assert_eq!(lifecycle.state(), LifecycleState::Installed);
        assert!(matches!(
            lifecycle.activate().await,
            Err(OfflineError::NotInstalled(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_refuses_incomplete_version() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        storage
            .put("v1", &RequestKey::get("/"), &Response::ok("<html>"))
            .await
            .unwrap();

        let lifecycle = controller(
            "v1",
            &["/", "/static/css/styles.css"],
            Arc::clone(&storage),
            network_with_shell(),
            Arc::new(RecordingClients::default()),
        );
        assert_eq!(lifecycle.restore().await.unwrap(), LifecycleState::Uninstalled);

        let missing = controller(
            "v9",
            &["/"],
            storage,
            network_with_shell(),
            Arc::new(RecordingClients::default()),
        );
        assert_eq!(missing.restore().await.unwrap(), LifecycleState::Uninstalled);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = LifecycleController::new(
            &config("", &["/"]),
            Arc::new(MemoryStorage::new()),
            Arc::new(ScriptedNetwork::new()),
            Arc::new(RecordingClients::default()),
        );
        assert!(result.is_err());
    }
}
