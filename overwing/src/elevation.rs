//! Terrain elevation interface.
//!
//! The DEM reader lives outside the core; the scorer only needs the lowest
//! terrain within a radius to compute the effective altitude for the valley
//! boost.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::provider::BoxFuture;

/// Elevation lookup failure.
#[derive(Debug, Clone, Error)]
#[error("elevation lookup failed: {0}")]
pub struct ElevationError(pub String);

/// Capability interface to the terrain DEM.
pub trait ElevationGetter: Send + Sync {
    /// Lowest terrain elevation in meters within `radius_nm` of the point.
    fn get_lowest_elevation<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        lat: f64,
        lon: f64,
        radius_nm: f64,
    ) -> BoxFuture<'a, Result<i16, ElevationError>>;
}

/// Elevation getter that always reports sea level. Used for bring-up and for
/// oceans-only scenarios.
#[derive(Debug, Default, Clone, Copy)]
pub struct SeaLevel;

impl ElevationGetter for SeaLevel {
    fn get_lowest_elevation<'a>(
        &'a self,
        _cancel: &'a CancellationToken,
        _lat: f64,
        _lon: f64,
        _radius_nm: f64,
    ) -> BoxFuture<'a, Result<i16, ElevationError>> {
        Box::pin(async move { Ok(0) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sea_level() {
        let getter = SeaLevel;
        let cancel = CancellationToken::new();
        assert_eq!(
            getter
                .get_lowest_elevation(&cancel, 48.0, 7.0, 20.0)
                .await
                .unwrap(),
            0
        );
    }
}
