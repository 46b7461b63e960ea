//! Request classification and per-class caching strategies.
//!
//! | Class   | Network ok                         | Network down                          |
//! |---------|------------------------------------|---------------------------------------|
//! | Ignored | response as-is                     | error propagates                      |
//! | Api     | response as-is, never cached       | synthetic `{success:false,...,offline:true}` |
//! | Asset   | response, copy written to cache    | cached entry, shell for HTML, else 503 |

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::config::OfflineConfig;
use crate::error::Result;
use crate::http::{Request, RequestKey, Response};
use crate::keepalive::KeepAlive;
use crate::network::Network;

/// Path of the document served as the offline shell for HTML navigations.
const SHELL_PATH: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Passed through untouched; the cache is never consulted.
    Ignored,
    Api,
    Asset,
}

/// Classify a request. Checked in order: non-GET, API path, everything else.
pub fn classify(method: &Method, url: &Url, api_segment: &str) -> RequestClass {
    if method != Method::GET {
        RequestClass::Ignored
    } else if url.path().contains(api_segment) {
        RequestClass::Api
    } else {
        RequestClass::Asset
    }
}

/// Body of the substitute API response. Field order is part of the contract.
#[derive(Serialize)]
struct OfflineApiBody<'a> {
    success: bool,
    error: &'a str,
    offline: bool,
}

pub struct StrategyEngine {
    version: String,
    origin: Url,
    api_segment: String,
    offline_api_message: String,
    offline_asset_message: String,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
}

impl StrategyEngine {
    pub fn new(
        config: &OfflineConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
    ) -> Result<Self> {
        Ok(Self {
            version: config.cache_version.clone(),
            origin: config.origin_url()?,
            api_segment: config.api_segment.clone(),
            offline_api_message: config.offline_api_message.clone(),
            offline_asset_message: config.offline_asset_message.clone(),
            storage,
            network,
        })
    }

    pub fn classify(&self, request: &Request) -> RequestClass {
        classify(&request.method, &request.url, &self.api_segment)
    }

    /// Produce the response for an intercepted request.
    ///
    /// Only `Ignored` requests can fail; API and asset requests always
    /// resolve to a real or synthetic response. Cache writes started here
    /// are registered with `keep_alive` and not awaited.
    pub async fn handle(&self, request: &Request, keep_alive: &KeepAlive) -> Result<Response> {
        match self.classify(request) {
            RequestClass::Ignored => {
                debug!(method = %request.method, url = %request.url, "Passing request through");
                self.network.fetch(request).await
            }
            RequestClass::Api => self.network_only(request).await,
            RequestClass::Asset => Ok(self.network_first(request, keep_alive).await),
        }
    }

    async fn network_only(&self, request: &Request) -> Result<Response> {
        match self.network.fetch(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(url = %request.url, error = %e, "API request failed, answering offline");
                self.offline_api_response()
            }
        }
    }

    /// The substitute answer for API calls made without a network.
    pub fn offline_api_response(&self) -> Result<Response> {
        Response::json(&OfflineApiBody {
            success: false,
            error: &self.offline_api_message,
            offline: true,
        })
    }

    async fn network_first(&self, request: &Request, keep_alive: &KeepAlive) -> Response {
        let key = RequestKey::for_request(request, &self.origin);
        match self.network.fetch(request).await {
            Ok(response) => {
                let copy = response.clone();
                let storage = Arc::clone(&self.storage);
                let version = self.version.clone();
                keep_alive.wait_until("cache-put", async move {
                    match storage.put(&version, &key, &copy).await {
                        Ok(()) => debug!(cache = %version, key = %key, "Cached network response"),
                        Err(e) => warn!(cache = %version, key = %key, error = %e, "Failed to cache response"),
                    }
                });
                response
            }
            Err(e) => {
                debug!(key = %key, error = %e, "Network unavailable, falling back to cache");
                self.cache_fallback(request, &key).await
            }
        }
    }

    async fn cache_fallback(&self, request: &Request, key: &RequestKey) -> Response {
        if let Some(hit) = self.lookup(key).await {
            return hit;
        }
        if request.accepts_html() {
            if let Some(shell) = self.lookup(&RequestKey::get(SHELL_PATH)).await {
                debug!(key = %key, "Serving cached shell for offline navigation");
                return shell;
            }
        }
        debug!(key = %key, "Offline cache miss");
        Response::text(StatusCode::SERVICE_UNAVAILABLE, self.offline_asset_message.clone())
    }

    /// Read errors count as a miss.
    async fn lookup(&self, key: &RequestKey) -> Option<Response> {
        match self.storage.match_request(&self.version, key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(cache = %self.version, key = %key, error = %e, "Cache read failed");
                None
            }
        }
    }
}
