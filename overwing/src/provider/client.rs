//! Backoff-gated HTTP client.
//!
//! Wraps a pluggable transport with per-provider backoff, per-call timeouts
//! and cancellation. Status classification follows the error taxonomy: 5xx
//! and transport failures are transient, 429 honors Retry-After, other 4xx
//! are permanent and get a long hold instead of a retry storm.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::backoff::ProviderBackoff;

/// Default User-Agent. Wikimedia endpoints require an identifying agent.
const DEFAULT_USER_AGENT: &str = "overwing/0.4 (https://github.com/overwing/overwing)";

/// Hold applied to a provider after a permanent (non-429 4xx) response.
const PERMANENT_FAILURE_HOLD: Duration = Duration::from_secs(3600);

/// Boxed future type for dyn-compatible async transports.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Raw response from a transport: status, optional Retry-After, body bytes.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: Vec<u8>,
}

/// Transport-level failure (connect error, TLS, timeout inside the stack).
#[derive(Debug, Clone, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// Minimal HTTP transport the client drives.
///
/// Abstracted for dependency injection: tests drive the tile scheduler and
/// validator with canned responses and call counters.
pub trait HttpTransport: Send + Sync {
    /// Perform a GET request, returning the raw response.
    fn get<'a>(
        &'a self,
        url: &'a str,
        headers: &'a [(&'static str, String)],
    ) -> BoxFuture<'a, Result<HttpResponse, TransportError>>;

    /// Perform a POST request with a form-encoded body.
    fn post_form<'a>(
        &'a self,
        url: &'a str,
        body: &'a str,
        headers: &'a [(&'static str, String)],
    ) -> BoxFuture<'a, Result<HttpResponse, TransportError>>;
}

/// Real transport over reqwest with rustls.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create the transport. Connection pooling and TLS live in reqwest.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| TransportError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn convert(response: reqwest::Response) -> BoxFuture<'static, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError(format!("failed to read body: {e}")))?
                .to_vec();
            Ok(HttpResponse {
                status,
                retry_after,
                body,
            })
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get<'a>(
        &'a self,
        url: &'a str,
        headers: &'a [(&'static str, String)],
    ) -> BoxFuture<'a, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            let mut req = self.client.get(url);
            for (name, value) in headers {
                req = req.header(*name, value);
            }
            let response = req
                .send()
                .await
                .map_err(|e| TransportError(format!("GET {url} failed: {e}")))?;
            Self::convert(response).await
        })
    }

    fn post_form<'a>(
        &'a self,
        url: &'a str,
        body: &'a str,
        headers: &'a [(&'static str, String)],
    ) -> BoxFuture<'a, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            let mut req = self
                .client
                .post(url)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(body.to_string());
            for (name, value) in headers {
                req = req.header(*name, value);
            }
            let response = req
                .send()
                .await
                .map_err(|e| TransportError(format!("POST {url} failed: {e}")))?;
            Self::convert(response).await
        })
    }
}

/// Errors surfaced by [`Client`] requests.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The provider's backoff gate is closed; no request was sent.
    #[error("provider {provider} is backing off")]
    BackingOff { provider: String },

    /// 5xx, timeout or transport failure; backoff was extended.
    #[error("transient upstream failure from {provider}: {reason}")]
    Transient { provider: String, reason: String },

    /// 429 with the server's own pacing applied to the gate.
    #[error("throttled by {provider}")]
    Throttled { provider: String },

    /// Non-429 4xx; the provider is held for a long interval.
    #[error("permanent upstream failure from {provider}: HTTP {status}")]
    Permanent { provider: String, status: u16 },

    /// The owning task was cancelled. Never counted as a failure.
    #[error("request cancelled")]
    Cancelled,
}

impl ClientError {
    /// Whether the error should mark a tile Failed-with-retry rather than
    /// being propagated as a hard fault.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Transient { .. } | ClientError::Throttled { .. } | ClientError::BackingOff { .. }
        )
    }
}

/// Backoff-gated HTTP client shared by every upstream consumer.
pub struct Client {
    transport: Arc<dyn HttpTransport>,
    backoff: Arc<ProviderBackoff>,
}

impl Client {
    pub fn new(transport: Arc<dyn HttpTransport>, backoff: Arc<ProviderBackoff>) -> Self {
        Self { transport, backoff }
    }

    /// Backoff handle, for diagnostics endpoints.
    pub fn backoff(&self) -> &Arc<ProviderBackoff> {
        &self.backoff
    }

    /// GET with backoff gating, timeout and cancellation.
    pub async fn get(
        &self,
        cancel: &CancellationToken,
        provider: &str,
        url: &str,
        headers: &[(&'static str, String)],
        timeout: Duration,
    ) -> Result<Vec<u8>, ClientError> {
        self.request(cancel, provider, timeout, self.transport.get(url, headers))
            .await
    }

    /// POST a form body with backoff gating, timeout and cancellation.
    pub async fn post_form(
        &self,
        cancel: &CancellationToken,
        provider: &str,
        url: &str,
        body: &str,
        headers: &[(&'static str, String)],
        timeout: Duration,
    ) -> Result<Vec<u8>, ClientError> {
        self.request(
            cancel,
            provider,
            timeout,
            self.transport.post_form(url, body, headers),
        )
        .await
    }

    async fn request(
        &self,
        cancel: &CancellationToken,
        provider: &str,
        timeout: Duration,
        fut: BoxFuture<'_, Result<HttpResponse, TransportError>>,
    ) -> Result<Vec<u8>, ClientError> {
        if !self.backoff.allowed(provider) {
            return Err(ClientError::BackingOff {
                provider: provider.to_string(),
            });
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            outcome = tokio::time::timeout(timeout, fut) => outcome,
        };

        let response = match outcome {
            Err(_elapsed) => {
                self.backoff.record_failure(provider);
                return Err(ClientError::Transient {
                    provider: provider.to_string(),
                    reason: format!("timeout after {timeout:?}"),
                });
            }
            Ok(Err(e)) => {
                self.backoff.record_failure(provider);
                return Err(ClientError::Transient {
                    provider: provider.to_string(),
                    reason: e.to_string(),
                });
            }
            Ok(Ok(response)) => response,
        };

        match response.status {
            200..=299 => {
                self.backoff.record_success(provider);
                Ok(response.body)
            }
            429 => {
                let next = self.backoff.record_failure(provider);
                if let Some(retry_after) = response.retry_after {
                    let server_gate = Instant::now() + retry_after;
                    if server_gate > next {
                        self.backoff.hold_until(provider, server_gate);
                    }
                }
                Err(ClientError::Throttled {
                    provider: provider.to_string(),
                })
            }
            status @ 500..=599 => {
                self.backoff.record_failure(provider);
                Err(ClientError::Transient {
                    provider: provider.to_string(),
                    reason: format!("HTTP {status}"),
                })
            }
            status => {
                tracing::warn!(provider, status, "Permanent upstream failure");
                self.backoff
                    .hold_until(provider, Instant::now() + PERMANENT_FAILURE_HOLD);
                Err(ClientError::Permanent {
                    provider: provider.to_string(),
                    status,
                })
            }
        }
    }
}
