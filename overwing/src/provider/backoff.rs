//! Per-provider exponential backoff.
//!
//! Each upstream (SPARQL, entity API, thumbnails) gets an independent failure
//! count and next-allowed instant. Failures double the delay with ±20% jitter;
//! successes decrement the count so a provider heals gradually instead of
//! snapping back to full rate after one good response.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;

/// Default base delay after the first failure.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Default cap on the computed delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5 * 60);

/// Jitter fraction applied to every computed delay.
const JITTER_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, Default)]
struct ProviderState {
    failures: u32,
    next_allowed: Option<Instant>,
}

/// Tracks backoff state for any number of named providers.
#[derive(Debug)]
pub struct ProviderBackoff {
    base_delay: Duration,
    max_delay: Duration,
    inner: Mutex<HashMap<String, ProviderState>>,
}

impl Default for ProviderBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl ProviderBackoff {
    /// Create a backoff tracker with the given base and maximum delays.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failed request and push out the provider's next-allowed time.
    ///
    /// The delay is `min(max_delay, base_delay * 2^(failures-1))` with ±20%
    /// jitter. Returns the instant at which the next request is permitted.
    pub fn record_failure(&self, provider: &str) -> Instant {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.entry(provider.to_string()).or_default();
        state.failures += 1;

        let exp = state.failures.saturating_sub(1).min(20);
        let raw = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);

        let jitter = rand::rng().random_range(-JITTER_FRACTION..=JITTER_FRACTION);
        let delay = raw.mul_f64(1.0 + jitter);

        let next = Instant::now() + delay;
        state.next_allowed = Some(next);
        tracing::debug!(
            provider,
            failures = state.failures,
            delay_ms = delay.as_millis() as u64,
            "Provider backoff extended"
        );
        next
    }

    /// Record a successful request: one failure is forgiven.
    pub fn record_success(&self, provider: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(state) = inner.get_mut(provider) {
            state.failures = state.failures.saturating_sub(1);
            if state.failures == 0 {
                state.next_allowed = None;
            }
        }
    }

    /// Whether a request to the provider is permitted right now.
    pub fn allowed(&self, provider: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.get(provider).and_then(|s| s.next_allowed) {
            Some(next) => Instant::now() >= next,
            None => true,
        }
    }

    /// Override the next-allowed instant, e.g. from a Retry-After header.
    ///
    /// Only moves the gate outward; an earlier instant than the current gate
    /// is ignored.
    pub fn hold_until(&self, provider: &str, until: Instant) {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.entry(provider.to_string()).or_default();
        match state.next_allowed {
            Some(existing) if existing >= until => {}
            _ => state.next_allowed = Some(until),
        }
    }

    /// Diagnostic snapshot: (consecutive failures, next-allowed instant).
    pub fn get_state(&self, provider: &str) -> (u32, Option<Instant>) {
        let inner = self.inner.lock().unwrap();
        inner
            .get(provider)
            .map(|s| (s.failures, s.next_allowed))
            .unwrap_or((0, None))
    }
}
