use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Default ceiling for a whole HTTP call, connection included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Header Sentry uses to explain why a request was rejected.
pub const SENTRY_ERROR_HEADER: &str = "X-Sentry-Error";

/// One POST to the store endpoint.
#[derive(Clone, Debug)]
pub struct IngestRequest {
    pub url: String,
    /// Headers in sending order; names may repeat.
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

/// What the delivery path needs to know about a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestResponse {
    pub status: u16,
    /// Reason line for the failure: `X-Sentry-Error` if present, else the status.
    pub reason: String,
}

impl IngestResponse {
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,
}

/// Asynchronous carrier of ingestion requests.
///
/// The delivery loop calls `post` from its background task and never on an
/// application thread. Implementations only move bytes and report the
/// status; classification and retry are handled by the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request.
    ///
    /// **Returns**
    /// - `Ok(..)` with the status whenever the server answered, success or not.
    /// - `Err(..)` if no response was obtained (connection error, timeout).
    async fn post(&self, request: IngestRequest) -> Result<IngestResponse, TransportError>;
}

/// [`Transport`] over HTTP(S) using `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a transport whose calls are each bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: IngestRequest) -> Result<IngestResponse, TransportError> {
        let mut builder = self.client.post(&request.url).body(request.body);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Request(e.to_string())
            }
        })?;

        let status = resp.status();
        let reason = resp
            .headers()
            .get(SENTRY_ERROR_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map_or_else(|| status.to_string(), str::to_string);

        Ok(IngestResponse::new(status.as_u16(), reason))
    }
}
