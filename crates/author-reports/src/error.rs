//! Error types for the reporting engine

use thiserror::Error;

use crate::window::WindowParams;

/// Failure of a single upstream marketplace call
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned status {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("{endpoint} still rate limited after {attempts} attempts")]
    RateLimited { endpoint: String, attempts: u32 },

    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// Raised by non-HTTP implementations (test doubles, alternative transports)
    #[error("upstream failure: {0}")]
    Other(String),
}

/// Failure of the cache store
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize cache value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure of a report request
#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Upstream(#[from] ApiError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("statement pagination did not terminate within {pages} pages")]
    PageLimitExceeded { pages: u32 },

    #[error("cannot resolve a report window from {0:?}")]
    InvalidWindow(WindowParams),
}

pub type Result<T, E = ReportError> = std::result::Result<T, E>;
