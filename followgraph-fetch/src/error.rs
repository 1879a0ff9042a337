use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("No proxy available and local-address fallback is disabled")]
    NoProxyAvailable,

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

impl FetchError {
    /// Whether the failure points at the proxy (transport trouble or a block) rather than the request.
    pub fn blames_proxy(&self) -> bool {
        matches!(
            self,
            FetchError::Http(_) | FetchError::Status { status: 403 | 407 | 429, .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
