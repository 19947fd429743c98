//! Error taxonomy for the inventory engine.

use thiserror::Error;

/// Errors raised by upstream lookups, the cache store and the session actor.
///
/// Every variant except [`InventoryError::Cancelled`] and [`InventoryError::SessionClosed`] is
/// recovered locally (partial results, stale cache, empty image list) and never reaches the
/// hosting UI as a hard failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("upstream reported an error: {0}")]
    Upstream(String),

    #[error("cache store failure: {0}")]
    CacheStore(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("session is closed")]
    SessionClosed,
}

pub type InventoryResult<T> = Result<T, InventoryError>;

impl InventoryError {
    /// Whether the caller should fall back (partial result, stale cache) instead of giving up.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::SessionClosed)
    }

    /// Short machine-friendly label used in log fields and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::MalformedResponse(_) => "malformed",
            Self::Upstream(_) => "upstream",
            Self::CacheStore(_) => "cache_store",
            Self::Cancelled => "cancelled",
            Self::SessionClosed => "session_closed",
        }
    }
}

impl From<reqwest::Error> for InventoryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for InventoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}
