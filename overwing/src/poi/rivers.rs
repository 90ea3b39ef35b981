//! River sentinel interface.
//!
//! The river GeoJSON index lives outside the core; it surfaces the best river
//! candidate ahead of the aircraft as a name, an optional QID guess and the
//! nearby polyline. The manager confirms the guess through the validator
//! before the river is allowed to compete for narration.

use crate::geo::{closest_point_on_segment, point_to_segment_m};

/// A river candidate surfaced by the sentinel.
#[derive(Debug, Clone)]
pub struct RiverCandidate {
    /// English name carried by the GeoJSON feature.
    pub name: String,
    /// Heuristic QID guess, if the layer has one.
    pub qid_guess: Option<String>,
    /// Nearby polyline vertices as (lat, lon).
    pub polyline: Vec<(f64, f64)>,
}

impl RiverCandidate {
    /// Closest point on the polyline to the given position.
    ///
    /// Returns `None` for a degenerate polyline with fewer than two vertices.
    pub fn closest_point(&self, lat: f64, lon: f64) -> Option<(f64, f64)> {
        if self.polyline.len() < 2 {
            return self.polyline.first().copied();
        }

        let mut best: Option<((f64, f64), f64)> = None;
        for pair in self.polyline.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let d = point_to_segment_m(lat, lon, a.0, a.1, b.0, b.1);
            if best.map(|(_, bd)| d < bd).unwrap_or(true) {
                let point = closest_point_on_segment(lat, lon, a.0, a.1, b.0, b.1);
                best = Some((point, d));
            }
        }
        best.map(|(p, _)| p)
    }
}

/// Capability interface to the river GeoJSON index.
pub trait RiverSentinel: Send + Sync {
    /// Best river candidate ahead of the aircraft, if any.
    fn best_candidate_ahead(&self, lat: f64, lon: f64, heading_deg: f64)
        -> Option<RiverCandidate>;
}
