use crate::error::Error;
use std::env;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(1);

/// Retry settings consumed by [`crate::RateLimitClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Retries beyond the initial attempt.
    pub max_retries: u32,
    /// Base of the exponential backoff used when the server gives no guidance.
    pub base_backoff: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: DEFAULT_BASE_BACKOFF,
        }
    }
}

/// Runtime configuration for the HTTP client and its rate limiter.
/// Values are sourced from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: DEFAULT_BASE_BACKOFF,
            timeout_secs: 30,
            user_agent: default_user_agent(),
            token: None,
        }
    }
}

impl Config {
    /// Load configuration from environment.
    ///
    /// Env vars:
    /// - RATELIMIT_MAX_RETRIES (default: 5)
    /// - RATELIMIT_BASE_BACKOFF_MS (default: 1000)
    /// - RATELIMIT_HTTP_TIMEOUT_SECS (default: 30)
    /// - RATELIMIT_USER_AGENT (default: ratelimit-client/<version>)
    /// - RATELIMIT_TOKEN (optional bearer token)
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let max_retries = parse_var(&lookup, "RATELIMIT_MAX_RETRIES")?
            .unwrap_or(defaults.max_retries);
        let base_backoff = parse_var::<u64, _>(&lookup, "RATELIMIT_BASE_BACKOFF_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.base_backoff);
        let timeout_secs = parse_var(&lookup, "RATELIMIT_HTTP_TIMEOUT_SECS")?
            .unwrap_or(defaults.timeout_secs);
        let user_agent = lookup("RATELIMIT_USER_AGENT").unwrap_or(defaults.user_agent);
        let token = lookup("RATELIMIT_TOKEN").filter(|t| !t.trim().is_empty());

        Ok(Self {
            max_retries,
            base_backoff,
            timeout_secs,
            user_agent,
            token,
        })
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_retries: self.max_retries,
            base_backoff: self.base_backoff,
        }
    }
}

fn default_user_agent() -> String {
    format!("ratelimit-client/{}", env!("CARGO_PKG_VERSION"))
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, Error>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} must be a non-negative integer, got {:?}", key, raw))),
    }
}
