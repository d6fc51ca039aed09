//! Adaptive client-side rate limiting for outbound HTTP calls.
//!
//! Wrap a transport in a [`RateLimitClient`] and route every request to the
//! same third-party API through it. The client obeys `x-ratelimit-*` headers
//! when the server sends them, otherwise probes upward for a safe request
//! rate and locks onto it after the first `429`.

pub mod config;
pub mod error;
pub mod http;
pub mod throttle;
pub mod types;

pub use config::{Config, RateLimitConfig};
pub use error::{Error, Result};
pub use http::{ReqwestTransport, Transport};
pub use throttle::{Cadence, RateLimitClient};
pub use types::RateSnapshot;
