use surge_core::ConfigError;
use thiserror::Error;

/// A request that never produced an HTTP response.
///
/// An HTTP error status (e.g. 500) is *not* a `RequestError`; it is a regular response that
/// checks get to judge.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RequestError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Body(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

/// Fatal setup errors. A run returning one of these never started a virtual user.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("target {url} is unreachable: {source}")]
    Unreachable { url: String, source: RequestError },
}
