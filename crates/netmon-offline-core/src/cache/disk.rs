//! Persistent cache store.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/ACTIVATED                               name of the last activated version
//! <root>/<hex(version name)>/<sha256(key)>.entry one JSON meta line, then the raw body
//! ```
//!
//! Every file is written to a temporary name and renamed into place. An
//! entry's meta and body share one file, so a reader sees either the old
//! entry or the new one, never a mix.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use super::{ensure_storable, CacheStorage};
use crate::error::{OfflineError, Result};
use crate::http::{RequestKey, Response};

const ENTRY_EXTENSION: &str = "entry";
const ACTIVATED_FILE: &str = "ACTIVATED";

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: RequestKey,
    status: u16,
    /// Header name and hex-encoded raw value.
    headers: Vec<(String, String)>,
    cached_at: DateTime<Utc>,
}

impl EntryMeta {
    fn new(key: &RequestKey, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), hex::encode(value.as_bytes())))
            .collect();
        Self {
            key: key.clone(),
            status: response.status.as_u16(),
            headers,
            cached_at: Utc::now(),
        }
    }

    fn into_response(self, body: Vec<u8>) -> Result<Response> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| OfflineError::Cache(format!("stored status {}: {}", self.status, e)))?;
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let parsed = hex::decode(value).ok().and_then(|raw| {
                Some((
                    HeaderName::from_bytes(name.as_bytes()).ok()?,
                    HeaderValue::from_bytes(&raw).ok()?,
                ))
            });
            match parsed {
                Some((name, value)) => {
                    headers.append(name, value);
                }
                None => debug!(header = %name, "Skipping unreadable stored header"),
            }
        }
        Ok(Response::new(status, headers, body))
    }
}

/// Serialize an entry as a meta line followed by the body.
fn encode_entry(meta: &EntryMeta, body: &[u8]) -> Result<Vec<u8>> {
    let mut contents = serde_json::to_vec(meta)?;
    contents.push(b'\n');
    contents.extend_from_slice(body);
    Ok(contents)
}

fn decode_entry(contents: &[u8]) -> Result<(EntryMeta, Vec<u8>)> {
    let split = contents
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| OfflineError::Cache("cache entry without meta line".to_string()))?;
    let meta = serde_json::from_slice(&contents[..split])?;
    Ok((meta, contents[split + 1..].to_vec()))
}

pub struct DiskStorage {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl DiskStorage {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_dir(&self, name: &str) -> PathBuf {
        self.root.join(hex::encode(name.as_bytes()))
    }

    fn entry_path(&self, name: &str, key: &RequestKey) -> PathBuf {
        let digest = Sha256::digest(key.to_string().as_bytes());
        self.version_dir(name)
            .join(format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION))
    }

    /// Write `contents` next to `path` and rename it into place.
    async fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let nonce = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(format!(".tmp-{}-{}", std::process::id(), nonce));
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, contents).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Read only the meta line of an entry file.
    async fn read_meta(path: &Path) -> Result<Option<EntryMeta>> {
        let file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut line = Vec::new();
        BufReader::new(file).read_until(b'\n', &mut line).await?;
        Ok(Some(serde_json::from_slice(line.trim_ascii_end())?))
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> Result<()> {
        fs::create_dir_all(self.version_dir(name)).await?;
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(fs::try_exists(self.version_dir(name)).await?)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            let decoded = file_name
                .to_str()
                .and_then(|s| hex::decode(s).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok());
            match decoded {
                Some(name) => names.push(name),
                None => debug!(dir = ?file_name, "Ignoring foreign directory in cache root"),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        match fs::remove_dir_all(self.version_dir(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
        ensure_storable(key)?;
        fs::create_dir_all(self.version_dir(name)).await?;

        let contents = encode_entry(&EntryMeta::new(key, response), &response.body)?;
        self.write_atomic(&self.entry_path(name, key), &contents).await
    }

    async fn match_request(&self, name: &str, key: &RequestKey) -> Result<Option<Response>> {
        let contents = match fs::read(self.entry_path(name, key)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let (meta, body) = decode_entry(&contents)?;
        if &meta.key != key {
            warn!(cache = name, key = %key, stored = %meta.key, "Cache entry digest collision");
            return Ok(None);
        }
        debug!(cache = name, key = %key, cached_at = %meta.cached_at, "Disk cache hit");
        meta.into_response(body).map(Some)
    }

    async fn entry_keys(&self, name: &str) -> Result<Vec<RequestKey>> {
        let mut dir = match fs::read_dir(self.version_dir(name)).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            match Self::read_meta(&path).await {
                Ok(Some(meta)) => keys.push(meta.key),
                Ok(None) => {}
                Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable cache entry"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn mark_activated(&self, name: &str) -> Result<()> {
        self.write_atomic(&self.root.join(ACTIVATED_FILE), name.as_bytes())
            .await
    }

    async fn activated(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.root.join(ACTIVATED_FILE)).await {
            Ok(name) if !name.is_empty() => Ok(Some(name)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
