//! Delivery of a single queued message, with bounded retry.

use crate::dsn::Endpoint;
use crate::encoder::Message;
use crate::transport::{IngestRequest, IngestResponse, Transport, TransportError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

pub const AUTH_HEADER: &str = "X-Sentry-Auth";
pub const USER_AGENT: &str = concat!("raven-log-sink/", env!("CARGO_PKG_VERSION"));
const PROTOCOL_VERSION: &str = "Sentry sentry_version=7";

/// How a single attempt ended, and what the sender should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    Success,
    /// Rate limited; stop now and let the delivery loop slow down.
    Throttled,
    /// The request itself is at fault; sending it again cannot help.
    NonRetryable,
    /// The server or the network failed; another attempt may succeed.
    Retryable,
}

impl Classification {
    pub fn of_status(status: u16) -> Self {
        match status {
            200..=299 => Classification::Success,
            429 => Classification::Throttled,
            500..=599 => Classification::Retryable,
            _ => Classification::NonRetryable,
        }
    }

    pub fn of_transport_error(_err: &TransportError) -> Self {
        Classification::Retryable
    }
}

/// Backoff schedule of one send: wait `initial` before the second attempt,
/// doubling each time, and stop once the wait would reach `limit`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub limit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            limit: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Pauses taken before each attempt; the first is always zero.
    pub fn schedule(&self) -> Vec<Duration> {
        let mut waits = Vec::new();
        let mut wait = self.initial;
        while wait < self.limit && !wait.is_zero() {
            waits.push(if waits.is_empty() { Duration::ZERO } else { wait });
            wait *= 2;
        }
        if waits.is_empty() {
            waits.push(Duration::ZERO);
        }
        waits
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("empty message payload")]
    EmptyPayload,

    #[error("throttle required, Sentry API overloaded")]
    Throttled,

    #[error("Sentry API request error: {0}")]
    NonRetryable(String),

    #[error("Sentry API server error after {attempts} attempts: {reason}")]
    RetriesExhausted { attempts: usize, reason: String },
}

/// Build the request for `message`. Authentication values go out as separate
/// `X-Sentry-Auth` headers: protocol version, message timestamp, then the
/// endpoint's keys.
pub fn build_request(endpoint: &Endpoint, message: &Message) -> IngestRequest {
    let mut headers = vec![
        ("User-Agent", USER_AGENT.to_string()),
        ("Content-Type", "application/json".to_string()),
        (AUTH_HEADER, PROTOCOL_VERSION.to_string()),
        (AUTH_HEADER, format!("sentry_timestamp={}", message.timestamp.timestamp())),
    ];
    headers.extend(endpoint.auth.iter().map(|a| (AUTH_HEADER, a.clone())));
    IngestRequest {
        url: endpoint.url.clone(),
        headers,
        body: message.payload.clone(),
    }
}

/// Deliver `message`, retrying server and network failures per `policy`.
pub async fn send(
    transport: &dyn Transport,
    endpoint: &Endpoint,
    policy: &RetryPolicy,
    message: &Message,
) -> Result<(), DeliveryError> {
    if message.payload.is_empty() {
        return Err(DeliveryError::EmptyPayload);
    }

    let schedule = policy.schedule();
    let mut reason = String::new();
    for (attempt, wait) in schedule.iter().enumerate() {
        if !wait.is_zero() {
            sleep(*wait).await;
        }

        let outcome = transport.post(build_request(endpoint, message)).await;
        let class = match &outcome {
            Ok(IngestResponse { status, .. }) => Classification::of_status(*status),
            Err(e) => Classification::of_transport_error(e),
        };
        match (class, outcome) {
            (Classification::Success, _) => return Ok(()),
            (Classification::Throttled, _) => return Err(DeliveryError::Throttled),
            (Classification::NonRetryable, Ok(resp)) => {
                return Err(DeliveryError::NonRetryable(resp.reason))
            }
            (_, Ok(resp)) => reason = resp.reason,
            (_, Err(e)) => reason = e.to_string(),
        }
        debug!(target: "raven", attempt = attempt + 1, %reason, "retryable delivery failure");
    }

    Err(DeliveryError::RetriesExhausted {
        attempts: schedule.len(),
        reason,
    })
}
