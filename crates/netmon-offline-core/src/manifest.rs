//! The fixed list of resources pre-populated into a cache version at install.

use crate::error::{OfflineError, Result};

/// Everything the dashboard shell needs to render while offline.
/// Any resource missing here is simply unavailable offline.
const DEFAULT_ASSETS: &[&str] = &[
    "/",
    "/static/css/styles.css",
    "/static/css/themes.css",
    "/static/js/theme.js",
    "/static/js/main.js",
    "/static/js/pwa.js",
    "/static/js/chart.min.js",
    "/static/icons/favicon.ico",
    "/static/icons/logo.png",
    "/static/icons/icon-192x192.png",
    "/static/icons/icon-512x512.png",
    "/static/manifest.json",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetManifest {
    entries: Vec<String>,
}

impl AssetManifest {
    /// Build a manifest from absolute paths. Duplicates are dropped, first
    /// occurrence wins.
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for entry in entries {
            let entry = entry.into();
            if !entry.starts_with('/') {
                return Err(OfflineError::InvalidConfig(format!(
                    "asset {:?} is not an absolute path",
                    entry
                )));
            }
            if !unique.contains(&entry) {
                unique.push(entry);
            }
        }
        Ok(Self { entries: unique })
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e == path)
    }
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self {
            entries: DEFAULT_ASSETS.iter().map(|s| s.to_string()).collect(),
        }
    }
}
