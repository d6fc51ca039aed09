//! Adaptive client-side rate limiting.
//!
//! [`RateLimitClient`] wraps a [`Transport`] and, for every call:
//!
//! 1. paces the dispatch to the discovered cadence ([`Cadence`]),
//! 2. holds off while a declared quota window is exhausted,
//! 3. sends, ingests `x-ratelimit-*` headers and adjusts the cadence,
//! 4. on `429 Too Many Requests` waits ([`compute_wait`]) and retries.
//!
//! One client is meant to be shared (e.g. behind an `Arc`) by every task
//! talking to the same API. The state lock is never held across a sleep or
//! a network call, so concurrent callers may each decide to wait; that can
//! over-throttle a little under contention but never corrupts state.

pub mod backoff;
pub mod state;

pub use backoff::{compute_wait, LOCKED_COOLDOWN, MAX_BACKOFF};
pub use state::{Cadence, RateState};

use crate::config::{Config, RateLimitConfig};
use crate::error::{Error, Result};
use crate::http::{build_client, ReqwestTransport, Transport};
use crate::types::RateSnapshot;
use chrono::Utc;
use log::{debug, warn};
use reqwest::{Request, Response, StatusCode};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

pub struct RateLimitClient<T = ReqwestTransport> {
    transport: T,
    config: RateLimitConfig,
    state: Mutex<RateState>,
}

impl<T> std::fmt::Debug for RateLimitClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitClient")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}

impl RateLimitClient<ReqwestTransport> {
    /// Builds a client over a rustls `reqwest::Client` configured from `cfg`.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let client = build_client(cfg)?;
        Ok(Self::new(ReqwestTransport::new(client), cfg.rate_limit()))
    }
}

impl<T: Transport> RateLimitClient<T> {
    pub fn new(transport: T, config: RateLimitConfig) -> Self {
        Self {
            transport,
            config,
            state: Mutex::new(RateState::new()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn snapshot(&self) -> RateSnapshot {
        self.state().snapshot()
    }

    fn state(&self) -> MutexGuard<'_, RateState> {
        // Critical sections never leave the state half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends `request`, retrying on `429 Too Many Requests`.
    ///
    /// Returns the first non-429 response whatever its status. Transport
    /// errors are returned at once without retrying.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.run(request, None).await
    }

    /// Like [`execute`](Self::execute), but fails with
    /// [`Error::DeadlineExceeded`] as soon as any wait would end after
    /// `deadline`.
    pub async fn execute_with_deadline(
        &self,
        request: Request,
        deadline: Instant,
    ) -> Result<Response> {
        self.run(request, Some(deadline)).await
    }

    /// Waits until the discovered cadence allows another dispatch and claims
    /// that slot.
    pub async fn wait_for_slot(&self) {
        if let Some(slot) = self.reserve_slot(None) {
            tokio::time::sleep_until(slot).await;
        }
    }

    async fn run(&self, request: Request, deadline: Option<Instant>) -> Result<Response> {
        let max_retries = self.config.max_retries;
        if max_retries > 0 && request.try_clone().is_none() {
            return Err(Error::UncloneableRequest);
        }
        let mut template = Some(request);

        for attempt in 0..=max_retries {
            let slot = self.reserve_slot(deadline).ok_or(Error::DeadlineExceeded)?;
            tokio::time::sleep_until(slot).await;
            if attempt == 0 {
                self.wait_for_reset_window(deadline).await?;
            }

            let outgoing = next_request(&mut template, attempt == max_retries)?;
            let response = self.transport.send(outgoing).await?;
            let status = response.status();
            let throttled = status == StatusCode::TOO_MANY_REQUESTS;

            let locked = {
                let mut state = self.state();
                state.observe(response.headers());
                state.adjust(throttled);
                state.cadence.is_locked()
            };

            if !throttled {
                if attempt > 0 {
                    debug!("request succeeded after {} retries", attempt);
                }
                return Ok(response);
            }

            if attempt == max_retries {
                break;
            }

            let wait = compute_wait(response.headers(), attempt, locked, self.config.base_backoff);
            drop(response);
            warn!(
                "rate limited (status {}), attempt {}/{}, backing off {:?}",
                status,
                attempt + 1,
                max_retries + 1,
                wait
            );
            pause_until(Instant::now() + wait, deadline).await?;
        }

        warn!("giving up after {} rate-limited attempts", max_retries + 1);
        Err(Error::RetriesExhausted {
            attempts: max_retries + 1,
        })
    }

    fn reserve_slot(&self, deadline: Option<Instant>) -> Option<Instant> {
        let now = Instant::now();
        let slot = self.state().reserve_slot(now, deadline);
        match slot {
            Some(slot) if slot > now => debug!("pacing: next slot in {:?}", slot - now),
            None => debug!("pacing: next slot falls after the deadline"),
            _ => {}
        }
        slot
    }

    async fn wait_for_reset_window(&self, deadline: Option<Instant>) -> Result<()> {
        let wait = self.state().reset_window_wait(Utc::now());
        if let Some(wait) = wait {
            warn!("declared quota exhausted, waiting {:?} for window reset", wait);
            pause_until(Instant::now() + wait, deadline).await?;
        }
        Ok(())
    }
}

fn next_request(template: &mut Option<Request>, last: bool) -> Result<Request> {
    if last {
        return template.take().ok_or(Error::UncloneableRequest);
    }
    template
        .as_ref()
        .and_then(Request::try_clone)
        .ok_or(Error::UncloneableRequest)
}

async fn pause_until(until: Instant, deadline: Option<Instant>) -> Result<()> {
    if let Some(deadline) = deadline {
        if until.max(Instant::now()) > deadline {
            return Err(Error::DeadlineExceeded);
        }
    }
    tokio::time::sleep_until(until).await;
    Ok(())
}
