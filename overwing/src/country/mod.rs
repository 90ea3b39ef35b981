//! Country and feature lookup interfaces with a quantized LRU cache.
//!
//! The GeoJSON lookups are cheap but not free, and the aircraft asks for the
//! same answer many times a minute. Positions are quantized to 0.01 degrees
//! (~1 km) so nearby queries share a cache entry.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use tokio_util::sync::CancellationToken;

/// Quantization step in degrees (~1 km).
const QUANT_STEP_DEG: f64 = 0.01;

/// Default cache capacity.
const DEFAULT_CACHE_CAPACITY: u64 = 4_096;

/// Default entry TTL.
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Which zone of a country a point falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountryZone {
    Land,
    Territorial,
    Eez,
    International,
}

/// Country lookup result.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryInfo {
    pub code: String,
    pub name: String,
    pub zone: CountryZone,
    /// Distance to the nearest land border, in meters.
    pub distance_m: f64,
}

/// A named spatial feature at a point (national park, mountain range, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureInfo {
    pub qid: String,
    pub name: String,
    pub category: String,
}

/// Capability interface to the country GeoJSON index.
pub trait CountryService: Send + Sync {
    fn country_at_point(&self, lat: f64, lon: f64) -> Option<CountryInfo>;
}

/// Capability interface to the feature GeoJSON index.
pub trait FeatureService: Send + Sync {
    fn features_at_point(&self, lat: f64, lon: f64) -> Vec<FeatureInfo>;
}

/// Quantized cache key.
fn quantize(lat: f64, lon: f64) -> (i32, i32) {
    (
        (lat / QUANT_STEP_DEG).round() as i32,
        (lon / QUANT_STEP_DEG).round() as i32,
    )
}

/// Caching wrapper over a country service.
pub struct CachedCountryService {
    inner: Arc<dyn CountryService>,
    cache: Cache<(i32, i32), Option<CountryInfo>>,
}

impl CachedCountryService {
    pub fn new(inner: Arc<dyn CountryService>) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(DEFAULT_CACHE_CAPACITY)
                .time_to_live(DEFAULT_CACHE_TTL)
                .build(),
        }
    }

    /// Background maintenance loop: runs the cache's pending tasks on an
    /// interval until cancelled.
    pub async fn run_pruner(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.cache.run_pending_tasks(),
            }
        }
    }

    /// Cache entry count (after pending maintenance).
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl CountryService for CachedCountryService {
    fn country_at_point(&self, lat: f64, lon: f64) -> Option<CountryInfo> {
        let key = quantize(lat, lon);
        self.cache
            .get_with(key, || self.inner.country_at_point(lat, lon))
    }
}
