//! Geographic primitives.
//!
//! Provides the spherical-earth math the rest of the engine is built on:
//! haversine distances, initial bearings, destination points, and a local
//! equirectangular point-to-segment distance for short ranges.
//!
//! All angles are degrees, all distances meters unless a function name says
//! otherwise. Latitudes are WGS84 degrees north, longitudes degrees east.

mod track;

pub use track::{TrackBuffer, DEFAULT_TRACK_SAMPLES};

/// Mean earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per nautical mile.
pub const METERS_PER_NM: f64 = 1_852.0;

/// Meters per foot.
pub const METERS_PER_FT: f64 = 0.3048;

/// Great-circle distance between two points in meters (haversine).
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Great-circle distance in nautical miles.
pub fn haversine_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    haversine_m(lat1, lon1, lat2, lon2) / METERS_PER_NM
}

/// Initial great-circle bearing from point 1 to point 2, in [0, 360).
pub fn initial_bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let y = dlambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();

    let bearing = y.atan2(x).to_degrees();
    (bearing + 360.0) % 360.0
}

/// Destination point given a start, distance in meters and bearing in degrees.
///
/// Returns (latitude, longitude) in degrees.
pub fn destination_point(lat: f64, lon: f64, distance_m: f64, bearing_deg: f64) -> (f64, f64) {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let phi1 = lat.to_radians();
    let lambda1 = lon.to_radians();

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

    let lat2 = phi2.to_degrees();
    // Normalize longitude to [-180, 180]
    let lon2 = ((lambda2.to_degrees() + 540.0) % 360.0) - 180.0;

    (lat2, lon2)
}

/// Normalize any angle in degrees to [-180, 180].
pub fn normalize_angle(deg: f64) -> f64 {
    let mut a = deg % 360.0;
    if a > 180.0 {
        a -= 360.0;
    } else if a < -180.0 {
        a += 360.0;
    }
    a
}

/// Whether a bearing points into the forward half-plane of the given heading.
pub fn is_ahead(bearing_deg: f64, heading_deg: f64) -> bool {
    normalize_angle(bearing_deg - heading_deg).abs() < 90.0
}

/// Distance in meters from a point to a polyline segment.
///
/// Uses an equirectangular local approximation centered on the query point.
/// Accurate to well under 1% for segments up to ~50 km, which covers river
/// polylines near the aircraft.
pub fn point_to_segment_m(
    lat: f64,
    lon: f64,
    lat_a: f64,
    lon_a: f64,
    lat_b: f64,
    lon_b: f64,
) -> f64 {
    let (px, py) = project_local(lat, lon, lat, lon);
    let (ax, ay) = project_local(lat, lon, lat_a, lon_a);
    let (bx, by) = project_local(lat, lon, lat_b, lon_b);

    let (cx, cy) = closest_on_segment(px, py, ax, ay, bx, by);
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}

/// Closest point on a polyline segment to a query point.
///
/// Returns (latitude, longitude) of the closest point on segment A-B.
pub fn closest_point_on_segment(
    lat: f64,
    lon: f64,
    lat_a: f64,
    lon_a: f64,
    lat_b: f64,
    lon_b: f64,
) -> (f64, f64) {
    let (px, py) = project_local(lat, lon, lat, lon);
    let (ax, ay) = project_local(lat, lon, lat_a, lon_a);
    let (bx, by) = project_local(lat, lon, lat_b, lon_b);

    let (cx, cy) = closest_on_segment(px, py, ax, ay, bx, by);
    unproject_local(lat, lon, cx, cy)
}

/// Project to a local equirectangular plane in meters, origin at (lat0, lon0).
fn project_local(lat0: f64, lon0: f64, lat: f64, lon: f64) -> (f64, f64) {
    let x = (lon - lon0).to_radians() * lat0.to_radians().cos() * EARTH_RADIUS_M;
    let y = (lat - lat0).to_radians() * EARTH_RADIUS_M;
    (x, y)
}

fn unproject_local(lat0: f64, lon0: f64, x: f64, y: f64) -> (f64, f64) {
    let lat = lat0 + (y / EARTH_RADIUS_M).to_degrees();
    let lon = lon0 + (x / (EARTH_RADIUS_M * lat0.to_radians().cos())).to_degrees();
    (lat, lon)
}

fn closest_on_segment(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64) -> (f64, f64) {
    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return (ax, ay);
    }
    let t = (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0);
    (ax + t * dx, ay + t * dy)
}
