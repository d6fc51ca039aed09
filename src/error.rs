use thiserror::Error;

/// Errors surfaced by [`crate::RateLimitClient`] and its configuration layer.
///
/// Throttled responses never appear here unless every attempt was throttled.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection, timeout or protocol failure from the underlying transport.
    /// Never retried.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("exceeded maximum retry attempts after rate limiting ({attempts} attempts)")]
    RetriesExhausted { attempts: u32 },

    /// A wait at a pacing, reset-window or backoff point would outlast the
    /// caller's deadline.
    #[error("deadline exceeded while waiting for a rate limit slot")]
    DeadlineExceeded,

    #[error("request body cannot be cloned for retries")]
    UncloneableRequest,

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
