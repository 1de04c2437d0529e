use thiserror::Error;

/// Raw classification of how an upstream request attempt failed. The root
/// crate's `ErrorKind` (spec.md §7) maps onto these 1:1 for everything
/// except validation failures caught before a request is even built.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("no provider adapter for market={market:?} task_type={task_type:?}")]
    UnsupportedTask {
        market: crate::types::Market,
        task_type: crate::types::TaskType,
    },

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("http status {0}")]
    HttpStatus(u16),

    #[error("upstream provider error {code}: {description}")]
    Provider { code: i64, description: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("proxy error: {0}")]
    Proxy(String),

    #[error("malformed response body: {0}")]
    Decode(String),
}

impl UpstreamError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(std::time::Duration::from_secs(0))
        } else if err.is_connect() || err.is_request() {
            UpstreamError::Network(err.to_string())
        } else {
            UpstreamError::Network(err.to_string())
        }
    }
}
