use thiserror::Error;

#[derive(Error, Debug)]
pub enum OfflineError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Unexpected status {status} for {url}: {body}")]
    HttpStatus { status: u16, url: String, body: String },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Install of cache version {version} failed on {asset}: {reason}")]
    InstallFailed {
        version: String,
        asset: String,
        reason: String,
    },

    #[error("Cache version {0} has not been installed")]
    NotInstalled(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, OfflineError>;

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 200;

impl OfflineError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &[u8]) -> String {
        let text = String::from_utf8_lossy(body);
        if text.len() <= MAX_ERROR_BODY_LENGTH {
            text.into_owned()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &text[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, url: &str, body: &[u8]) -> Self {
        OfflineError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
            body: Self::truncate_body(body),
        }
    }

    /// Whether this error means the network could not be reached at all,
    /// as opposed to a local failure.
    pub fn is_network(&self) -> bool {
        matches!(self, OfflineError::Network(_) | OfflineError::Unreachable(_))
    }
}
