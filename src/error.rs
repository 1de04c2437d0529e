//! Error taxonomy — spec.md §7. Every outcome a `Task` can produce is one of
//! these tags, each with a fixed disposition (terminal → ack, transient →
//! no-ack). Grounded on the `Layer4Error` enum in the teacher's
//! `src/layer4/src/types.rs`, generalized from agent-execution errors to
//! crawl-task errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The broker will not redeliver this message.
    Terminal,
    /// The message is left un-acked; the broker redelivers after its
    /// visibility timeout.
    Transient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[error("invalid task")]
    InvalidTask,
    #[error("unsupported task")]
    UnsupportedTask,
    #[error("missing cookie")]
    MissingCookie,
    #[error("provider error")]
    ProviderError,
    #[serde(rename = "http_error_4xx")]
    #[error("http 4xx")]
    Http4xx,
    #[serde(rename = "http_error_5xx")]
    #[error("http 5xx")]
    Http5xx,
    #[error("timeout")]
    Timeout,
    #[error("network error")]
    NetworkError,
    #[error("proxy error")]
    ProxyError,
    #[error("cancelled")]
    Cancelled,
    #[error("internal error")]
    InternalError,
}

impl ErrorKind {
    pub fn disposition(&self) -> Disposition {
        use Disposition::*;
        match self {
            ErrorKind::InvalidTask
            | ErrorKind::UnsupportedTask
            | ErrorKind::MissingCookie
            | ErrorKind::ProviderError
            | ErrorKind::Http4xx => Terminal,
            ErrorKind::Http5xx
            | ErrorKind::Timeout
            | ErrorKind::NetworkError
            | ErrorKind::ProxyError
            | ErrorKind::Cancelled
            | ErrorKind::InternalError => Transient,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.disposition() == Disposition::Terminal
    }
}

/// Errors surfaced by the core's own plumbing (config, broker connectivity)
/// rather than by a single task's execution — these abort startup or a
/// consumer cycle rather than producing a `TaskResult`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("broker error: {0}")]
    Broker(#[from] redis::RedisError),

    #[error("resource cache error: {0}")]
    Resource(#[from] crawler_resources::ResourceError),

    #[error("internal error: {0}")]
    Internal(String),
}
