//! Upstream request plumbing: per-provider backoff and the gated HTTP client.

mod backoff;
mod client;

pub use backoff::{ProviderBackoff, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
pub use client::{
    BoxFuture, Client, ClientError, HttpResponse, HttpTransport, ReqwestTransport, TransportError,
};

#[cfg(test)]
pub use client::tests::MockTransport;
