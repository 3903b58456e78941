//! Resilient HTTP transport.
//!
//! One [`HttpExchange`] call is one physical request; [`Transport`] wraps it
//! with a fixed-delay retry policy.  An attempt succeeds only when the
//! server answers HTTP 200 *and* the body parses as JSON — a 200 with a
//! truncated or empty body counts as a failed attempt and is retried.
//! The transport never looks at the auth token; token lifecycle belongs to
//! the protocol client.

use crate::app::ports::ClockPort;
use core::fmt;
use log::{error, info};

/// A single physical HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// One physical attempt failed before a response was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    /// Connection could not be established (DNS, TCP, TLS).
    Connect,
    /// The request or response transfer failed mid-flight.
    Io,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connection failed"),
            Self::Io => write!(f, "transfer failed"),
        }
    }
}

/// One physical HTTP exchange.  Implemented by the TLS client adapter on
/// the device and by scripted mocks in tests.
pub trait HttpExchange {
    fn post_json(&mut self, url: &str, body: &str) -> Result<HttpResponse, HttpError>;
    fn get(&mut self, url: &str) -> Result<HttpResponse, HttpError>;
}

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before every attempt after the first.
    pub retry_delay_ms: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            retry_delay_ms: 30_000,
        }
    }
}

/// All attempts failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    Exhausted,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "all request attempts exhausted"),
        }
    }
}

pub struct Transport<E: HttpExchange> {
    exchange: E,
    policy: RetryPolicy,
}

impl<E: HttpExchange> Transport<E> {
    pub fn new(exchange: E) -> Self {
        Self::with_policy(exchange, RetryPolicy::default())
    }

    pub fn with_policy(exchange: E, policy: RetryPolicy) -> Self {
        Self { exchange, policy }
    }

    /// POST a JSON payload, retrying per policy, and return the parsed
    /// JSON response body.
    pub fn post(
        &mut self,
        clock: &impl ClockPort,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let body = payload.to_string();
        self.attempt_loop(clock, url, |exchange| exchange.post_json(url, &body))
    }

    /// GET a JSON resource, retrying per policy.
    pub fn get(
        &mut self,
        clock: &impl ClockPort,
        url: &str,
    ) -> Result<serde_json::Value, TransportError> {
        self.attempt_loop(clock, url, |exchange| exchange.get(url))
    }

    fn attempt_loop<F>(
        &mut self,
        clock: &impl ClockPort,
        url: &str,
        mut attempt: F,
    ) -> Result<serde_json::Value, TransportError>
    where
        F: FnMut(&mut E) -> Result<HttpResponse, HttpError>,
    {
        for n in 1..=self.policy.max_attempts {
            if n > 1 {
                info!(
                    "retrying request to {url} in {} ms (attempt {n}/{})",
                    self.policy.retry_delay_ms, self.policy.max_attempts
                );
                clock.sleep_ms(self.policy.retry_delay_ms);
            }
            match attempt(&mut self.exchange) {
                Ok(resp) if resp.status == 200 => match serde_json::from_str(&resp.body) {
                    Ok(json) => return Ok(json),
                    Err(_) => error!("response from {url} is not valid JSON"),
                },
                Ok(resp) => error!("unexpected HTTP status {} from {url}", resp.status),
                Err(e) => error!("request to {url} failed: {e}"),
            }
        }
        error!(
            "giving up on {url} after {} attempts",
            self.policy.max_attempts
        );
        Err(TransportError::Exhausted)
    }
}
