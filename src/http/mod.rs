use crate::config::Config;
use crate::error::Error;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, Request, Response};
use std::future::Future;
use std::time::Duration;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Sends fully formed requests. Implementations must be usable from many
/// tasks at once.
pub trait Transport: Send + Sync {
    fn send(&self, request: Request) -> impl Future<Output = reqwest::Result<Response>> + Send;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: Request) -> impl Future<Output = reqwest::Result<Response>> + Send {
        self.client.execute(request)
    }
}

pub fn build_client(cfg: &Config) -> Result<Client, Error> {
    let mut default_headers = HeaderMap::new();
    let ua = HeaderValue::from_str(&cfg.user_agent)
        .map_err(|e| Error::Config(format!("invalid user agent {:?}: {}", cfg.user_agent, e)))?;
    default_headers.insert(USER_AGENT, ua);
    // Authorization is the caller's concern; requests arrive already authenticated.
    let client = Client::builder()
        .default_headers(default_headers)
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .use_rustls_tls()
        .build()
        .map_err(|e| Error::Config(format!("cannot build HTTP client: {}", e)))?;
    Ok(client)
}

/// Quota values a server declared on one response. Each field is parsed on
/// its own; a malformed value leaves only that field unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredLimits {
    pub limit: Option<i64>,
    pub remaining: Option<i64>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl DeclaredLimits {
    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.remaining.is_none() && self.reset_at.is_none()
    }
}

pub fn extract_declared_limits(headers: &HeaderMap) -> DeclaredLimits {
    let limit = int_header(headers, LIMIT_HEADER);
    let remaining = int_header(headers, REMAINING_HEADER);
    let reset_at = int_header(headers, RESET_HEADER).and_then(|epoch| {
        let at = DateTime::<Utc>::from_timestamp(epoch, 0);
        if at.is_none() {
            debug!("ignoring out-of-range {} value {}", RESET_HEADER, epoch);
        }
        at
    });
    DeclaredLimits {
        limit,
        remaining,
        reset_at,
    }
}

fn int_header(headers: &HeaderMap, name: &str) -> Option<i64> {
    let raw = headers.get(name)?;
    let parsed = raw
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok());
    if parsed.is_none() {
        debug!("ignoring malformed {} header: {:?}", name, raw);
    }
    parsed
}

/// Server-directed wait from a `Retry-After` header, relative to `now`.
///
/// Accepts integer seconds or an HTTP-date. A value that parses but is not
/// positive yields `fallback`; an absent or unparsable header yields `None`.
pub fn retry_after_wait(
    headers: &HeaderMap,
    now: DateTime<Utc>,
    fallback: Duration,
) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = raw.parse::<i64>() {
        return Some(if secs > 0 {
            Duration::from_secs(secs.unsigned_abs())
        } else {
            fallback
        });
    }

    match parse_http_date(raw) {
        Some(date) => {
            let wait = (date - now)
                .to_std()
                .ok()
                .filter(|d| !d.is_zero())
                .unwrap_or(fallback);
            Some(wait)
        }
        None => {
            debug!("ignoring unparsable Retry-After header: {:?}", raw);
            None
        }
    }
}

/// RFC 850 and asctime, the obsolete HTTP-date forms recipients must still accept.
const OBSOLETE_DATE_FORMATS: [&str; 2] = ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"];

fn parse_http_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(raw) {
        return Some(date.with_timezone(&Utc));
    }
    OBSOLETE_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}
