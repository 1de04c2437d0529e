use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("broker connection error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("malformed cache record for key {key}: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
