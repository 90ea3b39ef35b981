//! Rolling track buffer for ground-track smoothing.
//!
//! Keeps a bounded FIFO of recent telemetry positions and derives the average
//! bearing from the oldest to the newest sample. Used when the simulator's
//! reported heading is stale, which happens during ground operations on some
//! connectors.

use std::collections::VecDeque;

use super::{haversine_m, initial_bearing_deg};

/// Default number of position samples to retain.
pub const DEFAULT_TRACK_SAMPLES: usize = 8;

/// Minimum movement in meters before a derived bearing is trusted.
const MIN_DISTANCE_FOR_BEARING_M: f64 = 30.0;

/// Bounded FIFO of recent positions exposing a smoothed bearing.
#[derive(Debug)]
pub struct TrackBuffer {
    samples: VecDeque<(f64, f64)>,
    capacity: usize,
}

impl Default for TrackBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_TRACK_SAMPLES)
    }
}

impl TrackBuffer {
    /// Create a track buffer holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.max(2)),
            capacity: capacity.max(2),
        }
    }

    /// Push a position sample and return the smoothed bearing.
    ///
    /// Returns `default_heading` while fewer than two samples are present or
    /// while the buffer span is too short for a reliable bearing; otherwise
    /// the bearing from the oldest to the newest sample.
    pub fn push(&mut self, lat: f64, lon: f64, default_heading: f64) -> f64 {
        self.samples.push_back((lat, lon));
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }

        self.bearing().unwrap_or(default_heading)
    }

    /// Bearing from the oldest to the newest sample, if the span is long
    /// enough to be meaningful.
    pub fn bearing(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let (lat1, lon1) = *self.samples.front()?;
        let (lat2, lon2) = *self.samples.back()?;

        if haversine_m(lat1, lon1, lat2, lon2) < MIN_DISTANCE_FOR_BEARING_M {
            return None;
        }
        Some(initial_bearing_deg(lat1, lon1, lat2, lon2))
    }

    /// Number of samples currently buffered.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drop all samples.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
