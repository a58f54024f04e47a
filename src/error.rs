// src/error.rs
use thiserror::Error;

/// Failures raised by the trend core.
#[derive(Debug, Error)]
pub enum TrendError {
    /// The ranked-set/metadata store could not be reached or did not answer in time.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// A record exists but has the wrong type or undecodable content.
    /// Readers degrade it to "absent" instead of failing the read.
    #[error("malformed store record: {0}")]
    MalformedRecord(String),
    /// A snapshot could not be encoded. Only ever seen inside the streamer.
    #[error("snapshot serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TrendError {
    fn from(err: serde_json::Error) -> Self {
        TrendError::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for TrendError {
    fn from(err: redis::RedisError) -> Self {
        if err.kind() == redis::ErrorKind::TypeError || err.code() == Some("WRONGTYPE") {
            return TrendError::MalformedRecord(err.to_string());
        }
        TrendError::StoreUnavailable(err.to_string())
    }
}

pub type TrendResult<T> = Result<T, TrendError>;
