//! Offline cache configuration.
//!
//! The configuration is an immutable value handed to the worker at
//! construction; nothing reads it from global state. It is stored at
//! `~/.config/netmon-offline/config.json` and every field has a default,
//! so a missing or partial file is fine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{OfflineError, Result};
use crate::manifest::AssetManifest;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "netmon-offline";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Cache generation shipped with the current dashboard build.
/// Bump on every redeploy to invalidate previously cached assets.
pub const DEFAULT_CACHE_VERSION: &str = "network-monitor-cache-v1";

/// The Flask backend listens here by default.
const DEFAULT_ORIGIN: &str = "http://127.0.0.1:5000/";

const DEFAULT_API_SEGMENT: &str = "/api/";

/// 30s matches the dashboard's own polling tolerance.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const DEFAULT_OFFLINE_API_MESSAGE: &str = "You are offline. Some features may be unavailable.";
const DEFAULT_OFFLINE_ASSET_MESSAGE: &str = "Failed to load the resource while offline.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationConfig {
    pub default_title: String,
    pub default_body: String,
    pub default_url: String,
    pub icon: String,
    pub badge: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_title: "Network Monitor".to_string(),
            default_body: "Network Monitor update".to_string(),
            default_url: "/".to_string(),
            icon: "/static/icons/icon-192x192.png".to_string(),
            badge: "/static/icons/badge-72x72.png".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OfflineConfig {
    /// Origin the dashboard is served from; manifest paths resolve against it.
    pub origin: String,
    pub cache_version: String,
    pub assets: Vec<String>,
    /// Any request whose path contains this segment is an API call.
    pub api_segment: String,
    pub request_timeout_secs: u64,
    pub offline_api_message: String,
    pub offline_asset_message: String,
    pub notifications: NotificationConfig,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            assets: AssetManifest::default().entries().to_vec(),
            api_segment: DEFAULT_API_SEGMENT.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            offline_api_message: DEFAULT_OFFLINE_API_MESSAGE.to_string(),
            offline_asset_message: DEFAULT_OFFLINE_ASSET_MESSAGE.to_string(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl OfflineConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| OfflineError::InvalidConfig("Could not find config directory".to_string()))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the persistent cache store.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| OfflineError::InvalidConfig("Could not find cache directory".to_string()))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin)
            .map_err(|e| OfflineError::InvalidConfig(format!("origin {:?}: {}", self.origin, e)))
    }

    pub fn manifest(&self) -> Result<AssetManifest> {
        AssetManifest::new(self.assets.iter().cloned())
    }

    /// Check the values a worker cannot run without.
    pub fn validate(&self) -> Result<()> {
        self.origin_url()?;
        if self.cache_version.trim().is_empty() {
            return Err(OfflineError::InvalidConfig("cache_version is empty".to_string()));
        }
        if self.api_segment.is_empty() {
            return Err(OfflineError::InvalidConfig("api_segment is empty".to_string()));
        }
        self.manifest()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = OfflineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache_version, "network-monitor-cache-v1");
        assert_eq!(config.assets.len(), 12);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: OfflineConfig =
            serde_json::from_str(r#"{ "cache_version": "network-monitor-cache-v2" }"#).unwrap();
        assert_eq!(config.cache_version, "network-monitor-cache-v2");
        assert_eq!(config.api_segment, "/api/");
        assert_eq!(config.notifications.default_url, "/");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = OfflineConfig {
            cache_version: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(OfflineError::InvalidConfig(_))));

        let config = OfflineConfig {
            origin: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = OfflineConfig {
            assets: vec!["static/css/styles.css".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
