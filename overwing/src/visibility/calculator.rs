//! Geometric visibility scoring.
//!
//! Combines distance decay against the altitude/size table with the cockpit's
//! bearing asymmetry and the blind spot directly under the nose. The sector
//! multipliers model a right-hand-seat pilot: the view over the left wing is
//! the money shot, everything behind the wing line is gone.

use crate::geo::normalize_angle;

use super::table::{SizeClass, VisibilityTable};

/// Altitude where the under-nose blind spot starts to exist.
const BLIND_SPOT_MIN_ALT_FT: f64 = 500.0;

/// Altitude at which the blind spot reaches its maximum radius.
const BLIND_SPOT_MAX_ALT_FT: f64 = 35_000.0;

/// Maximum blind-spot radius in nautical miles.
const BLIND_SPOT_MAX_RADIUS_NM: f64 = 5.0;

/// Multiplier applied inside the blind spot.
const BLIND_SPOT_FACTOR: f64 = 0.1;

/// Result of a visibility calculation: the score and its explanation lines.
#[derive(Debug, Clone, Default)]
pub struct VisibilityScore {
    pub score: f64,
    pub details: Vec<String>,
}

impl VisibilityScore {
    fn invisible(reason: &str) -> Self {
        Self {
            score: 0.0,
            details: vec![reason.to_string()],
        }
    }
}

/// Radius of the under-nose blind spot at the given altitude.
///
/// Grows linearly from zero at 500 ft AGL to 5.0 nm at 35,000 ft AGL and is
/// capped above that.
pub fn blind_spot_radius_nm(alt_agl_ft: f64) -> f64 {
    let t = (alt_agl_ft - BLIND_SPOT_MIN_ALT_FT) / (BLIND_SPOT_MAX_ALT_FT - BLIND_SPOT_MIN_ALT_FT);
    (t.clamp(0.0, 1.0)) * BLIND_SPOT_MAX_RADIUS_NM
}

/// Whether a POI falls inside the forward blind spot.
pub fn is_blind_spot(alt_agl_ft: f64, dist_nm: f64, rel_bearing_deg: f64) -> bool {
    dist_nm < blind_spot_radius_nm(alt_agl_ft) && rel_bearing_deg.abs() < 90.0
}

/// Bearing sector multiplier for a relative bearing normalized to [0, 360).
///
/// Returns the multiplier and the sector label.
pub fn bearing_multiplier(rel_bearing_deg: f64) -> (f64, &'static str) {
    let rb = rel_bearing_deg.rem_euclid(360.0);
    match rb {
        rb if rb < 90.0 => (1.0, "Right Front"),
        rb if rb < 225.0 => (0.0, "Rear"),
        rb if rb < 270.0 => (0.5, "Left Rear"),
        rb if rb < 300.0 => (1.5, "Left Side"),
        rb if rb < 330.0 => (2.0, "Left Front (Best)"),
        _ => (1.5, "Forward Left"),
    }
}

/// Geometric visibility of a POI from the aircraft.
///
/// `alt_agl_ft` is the real height above ground; `eff_alt_agl_ft` is MSL
/// minus the lowest terrain within the XL visibility radius. When the
/// effective altitude is higher the aircraft is over a valley and sees
/// farther, and the larger value drives the table lookup.
#[allow(clippy::too_many_arguments)]
pub fn calculate_poi_visibility(
    table: &VisibilityTable,
    heading_deg: f64,
    alt_agl_ft: f64,
    eff_alt_agl_ft: f64,
    bearing_deg: f64,
    dist_nm: f64,
    size: SizeClass,
    is_on_ground: bool,
    boost: f64,
) -> VisibilityScore {
    let valley_boosted = eff_alt_agl_ft > alt_agl_ft;
    let lookup_alt = if valley_boosted {
        eff_alt_agl_ft
    } else {
        alt_agl_ft
    };

    let max_dist = table.max_visible_dist_nm(lookup_alt, size, boost);
    if max_dist <= 0.0 || dist_nm > max_dist {
        return VisibilityScore::invisible("Invisible");
    }

    let mut details = Vec::with_capacity(3);
    if valley_boosted {
        details.push("Valley Boost Applied".to_string());
    }

    let base = (1.0 - dist_nm / max_dist).max(0.0);
    let mut score = base;
    details.push(format!(
        "Visibility ({}@{:.0}ft): x{:.2}",
        size, lookup_alt, base
    ));

    if !is_on_ground {
        let rel_bearing = normalize_angle(bearing_deg - heading_deg);

        if is_blind_spot(alt_agl_ft, dist_nm, rel_bearing) {
            score *= BLIND_SPOT_FACTOR;
            details.push(format!("Blind Spot: x{:.1}", BLIND_SPOT_FACTOR));
            return VisibilityScore { score, details };
        }

        let (mult, sector) = bearing_multiplier(rel_bearing);
        if mult != 1.0 {
            details.push(format!("{}: x{:.1}", sector, mult));
        }
        score *= mult;
    }

    VisibilityScore { score, details }
}

/// Numeric-only visibility for a hypothetical POI of the given size.
///
/// Side channel for the map heatmap endpoint; no detail strings.
#[allow(clippy::too_many_arguments)]
pub fn visibility_for_size(
    table: &VisibilityTable,
    heading_deg: f64,
    alt_agl_ft: f64,
    eff_alt_agl_ft: f64,
    bearing_deg: f64,
    dist_nm: f64,
    size: SizeClass,
    is_on_ground: bool,
    boost: f64,
) -> f64 {
    calculate_poi_visibility(
        table,
        heading_deg,
        alt_agl_ft,
        eff_alt_agl_ft,
        bearing_deg,
        dist_nm,
        size,
        is_on_ground,
        boost,
    )
    .score
}
