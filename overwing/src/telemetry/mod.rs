//! Telemetry pipeline.
//!
//! Pulls raw samples from the simulator client, smooths the heading through
//! the track buffer when the reported one is stale (ground operations on some
//! connectors report the last airborne heading), derives the predicted
//! position, and publishes the result to a versioned snapshot slot that every
//! other subsystem reads.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::geo::{destination_point, TrackBuffer, METERS_PER_NM};
use crate::provider::BoxFuture;

/// Prediction horizon for the published predicted position.
pub const DEFAULT_PREDICTION_HORIZON: Duration = Duration::from_secs(60);

/// Ground speed below which the reported heading is considered stale and the
/// derived track is preferred, in knots.
const STALE_HEADING_SPEED_KT: f64 = 3.0;

/// One smoothed telemetry snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub latitude: f64,
    pub longitude: f64,
    /// Feet above mean sea level.
    pub altitude_msl_ft: f64,
    /// Feet above ground level.
    pub altitude_agl_ft: f64,
    pub heading_deg: f64,
    pub ground_speed_kt: f64,
    pub is_on_ground: bool,
    pub predicted_latitude: f64,
    pub predicted_longitude: f64,
}

/// Result of polling the simulator.
#[derive(Debug, Clone)]
pub enum TelemetryPoll {
    Ready(Telemetry),
    /// The connector is alive but has no fix yet.
    Waiting,
}

/// Pull interface to the simulator connector (or its mock driver).
pub trait SimClient: Send + Sync {
    fn get_telemetry<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<TelemetryPoll, SimClientError>>;
}

/// Simulator connector failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("simulator connector error: {0}")]
pub struct SimClientError(pub String);

/// Versioned snapshot slot. Writers publish a full value; readers take the
/// latest without blocking the pipeline.
#[derive(Debug, Default)]
pub struct TelemetrySlot {
    inner: RwLock<(u64, Option<Telemetry>)>,
}

impl TelemetrySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new snapshot, bumping the version.
    pub fn publish(&self, telemetry: Telemetry) {
        let mut slot = self.inner.write();
        slot.0 += 1;
        slot.1 = Some(telemetry);
    }

    /// Latest snapshot, if any sample arrived yet.
    pub fn latest(&self) -> Option<Telemetry> {
        self.inner.read().1
    }

    /// Monotone version counter; 0 before the first publish.
    pub fn version(&self) -> u64 {
        self.inner.read().0
    }
}

/// The smoothing pipeline between the simulator and the engine.
pub struct TelemetryPipeline {
    slot: Arc<TelemetrySlot>,
    track: Mutex<TrackBuffer>,
    prediction_horizon: Duration,
}

impl TelemetryPipeline {
    pub fn new(slot: Arc<TelemetrySlot>) -> Self {
        Self {
            slot,
            track: Mutex::new(TrackBuffer::default()),
            prediction_horizon: DEFAULT_PREDICTION_HORIZON,
        }
    }

    pub fn with_prediction_horizon(mut self, horizon: Duration) -> Self {
        self.prediction_horizon = horizon;
        self
    }

    /// Snapshot slot handle for consumers.
    pub fn slot(&self) -> &Arc<TelemetrySlot> {
        &self.slot
    }

    /// Ingest one raw sample: smooth, predict, publish.
    pub fn update(&self, mut raw: Telemetry) {
        let smoothed = {
            let mut track = self.track.lock();
            track.push(raw.latitude, raw.longitude, raw.heading_deg)
        };

        // On the ground, slow taxi or pushback makes the reported heading
        // unreliable; prefer the derived ground track once it exists.
        if raw.is_on_ground && raw.ground_speed_kt >= STALE_HEADING_SPEED_KT {
            raw.heading_deg = smoothed;
        }

        let distance_m =
            raw.ground_speed_kt * METERS_PER_NM * self.prediction_horizon.as_secs_f64() / 3_600.0;
        let (plat, plon) =
            destination_point(raw.latitude, raw.longitude, distance_m, raw.heading_deg);
        raw.predicted_latitude = plat;
        raw.predicted_longitude = plon;

        self.slot.publish(raw);
    }

    /// Background loop: poll the simulator on an interval and publish every
    /// sample until cancelled. Connector errors are logged and retried; a
    /// `Waiting` poll publishes nothing.
    pub async fn run(
        self: Arc<Self>,
        sim: Arc<dyn SimClient>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!("Telemetry pipeline started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match sim.get_telemetry(&cancel).await {
                Ok(TelemetryPoll::Ready(raw)) => self.update(raw),
                Ok(TelemetryPoll::Waiting) => {
                    tracing::debug!("Simulator has no fix yet");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Telemetry poll failed");
                }
            }
        }
        tracing::info!("Telemetry pipeline stopped");
    }
}

/// Convenience constructor for raw samples.
impl Telemetry {
    pub fn sample(
        latitude: f64,
        longitude: f64,
        altitude_msl_ft: f64,
        altitude_agl_ft: f64,
        heading_deg: f64,
        ground_speed_kt: f64,
        is_on_ground: bool,
    ) -> Self {
        Self {
            latitude,
            longitude,
            altitude_msl_ft,
            altitude_agl_ft,
            heading_deg,
            ground_speed_kt,
            is_on_ground,
            predicted_latitude: latitude,
            predicted_longitude: longitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::haversine_nm;

    #[test]
    fn test_slot_starts_empty() {
        let slot = TelemetrySlot::new();
        assert!(slot.latest().is_none());
        assert_eq!(slot.version(), 0);
    }

    #[test]
    fn test_slot_publish_bumps_version() {
        let slot = TelemetrySlot::new();
        slot.publish(Telemetry::sample(48.0, 7.0, 5_000.0, 4_000.0, 90.0, 120.0, false));
        assert_eq!(slot.version(), 1);
        assert!(slot.latest().is_some());

        slot.publish(Telemetry::sample(48.1, 7.0, 5_000.0, 4_000.0, 90.0, 120.0, false));
        assert_eq!(slot.version(), 2);
        assert_eq!(slot.latest().unwrap().latitude, 48.1);
    }

    #[test]
    fn test_update_publishes_prediction() {
        let slot = Arc::new(TelemetrySlot::new());
        let pipeline = TelemetryPipeline::new(Arc::clone(&slot));

        // 120kt due north for 60s is 2nm
        pipeline.update(Telemetry::sample(48.0, 7.0, 5_000.0, 4_000.0, 0.0, 120.0, false));
        let t = slot.latest().unwrap();
        let d = haversine_nm(t.latitude, t.longitude, t.predicted_latitude, t.predicted_longitude);
        assert!((d - 2.0).abs() < 0.05, "got {}nm", d);
        assert!(t.predicted_latitude > t.latitude);
        assert!((t.predicted_longitude - 7.0).abs() < 0.001);
    }

    #[test]
    fn test_airborne_heading_not_overridden() {
        let slot = Arc::new(TelemetrySlot::new());
        let pipeline = TelemetryPipeline::new(Arc::clone(&slot));

        // Track says "east" but the reported heading stays authoritative
        // while airborne
        pipeline.update(Telemetry::sample(48.0, 7.00, 5_000.0, 4_000.0, 180.0, 120.0, false));
        pipeline.update(Telemetry::sample(48.0, 7.05, 5_000.0, 4_000.0, 180.0, 120.0, false));
        assert_eq!(slot.latest().unwrap().heading_deg, 180.0);
    }

    #[test]
    fn test_ground_heading_smoothed_from_track() {
        let slot = Arc::new(TelemetrySlot::new());
        let pipeline = TelemetryPipeline::new(Arc::clone(&slot));

        // Taxiing east while the connector reports a stale northerly heading
        pipeline.update(Telemetry::sample(48.0, 7.00, 800.0, 0.0, 0.0, 10.0, true));
        pipeline.update(Telemetry::sample(48.0, 7.01, 800.0, 0.0, 0.0, 10.0, true));

        let heading = slot.latest().unwrap().heading_deg;
        assert!((heading - 90.0).abs() < 2.0, "got {}", heading);
    }

    #[test]
    fn test_stationary_ground_keeps_reported_heading() {
        let slot = Arc::new(TelemetrySlot::new());
        let pipeline = TelemetryPipeline::new(Arc::clone(&slot));

        pipeline.update(Telemetry::sample(48.0, 7.0, 800.0, 0.0, 270.0, 0.0, true));
        pipeline.update(Telemetry::sample(48.0, 7.0, 800.0, 0.0, 270.0, 0.0, true));
        assert_eq!(slot.latest().unwrap().heading_deg, 270.0);
    }

    #[tokio::test]
    async fn test_run_publishes_until_cancelled() {
        struct ScriptedSim;
        impl SimClient for ScriptedSim {
            fn get_telemetry<'a>(
                &'a self,
                _cancel: &'a CancellationToken,
            ) -> BoxFuture<'a, Result<TelemetryPoll, SimClientError>> {
                Box::pin(async move {
                    Ok(TelemetryPoll::Ready(Telemetry::sample(
                        48.0, 7.0, 5_000.0, 4_000.0, 0.0, 120.0, false,
                    )))
                })
            }
        }

        let slot = Arc::new(TelemetrySlot::new());
        let pipeline = Arc::new(TelemetryPipeline::new(Arc::clone(&slot)));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(Arc::clone(&pipeline).run(
            Arc::new(ScriptedSim),
            Duration::from_millis(5),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(slot.version() >= 2);
    }

    #[tokio::test]
    async fn test_run_skips_waiting_polls() {
        struct WaitingSim;
        impl SimClient for WaitingSim {
            fn get_telemetry<'a>(
                &'a self,
                _cancel: &'a CancellationToken,
            ) -> BoxFuture<'a, Result<TelemetryPoll, SimClientError>> {
                Box::pin(async move { Ok(TelemetryPoll::Waiting) })
            }
        }

        let slot = Arc::new(TelemetrySlot::new());
        let pipeline = Arc::new(TelemetryPipeline::new(Arc::clone(&slot)));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(Arc::clone(&pipeline).run(
            Arc::new(WaitingSim),
            Duration::from_millis(5),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(slot.latest().is_none());
        assert_eq!(slot.version(), 0);
    }
}
