//! Spatial tiles: the unit of POI hydration.
//!
//! The world is cut into a fixed-resolution Web Mercator grid. A cell id is
//! derived deterministically from a coordinate, each cell knows its center
//! and the radius a fetch must cover, and the scheduler hydrates cells as the
//! aircraft approaches them.

mod grid;
mod scheduler;

pub use grid::{GridStats, TileGrid, TileStatus, TileWrapper};
pub use scheduler::{FetchError, FetchPhase, SchedulerConfig, TileScheduler};

use std::f64::consts::PI;

use crate::geo::haversine_m;

/// Fixed grid resolution. Zoom 12 cells are ~9.8 km on a side at the
/// equator, which matches the minimum upstream fetch radius.
pub const CELL_ZOOM: u8 = 12;

/// Cells per axis at [`CELL_ZOOM`].
const CELLS_PER_SIDE: u32 = 1 << CELL_ZOOM;

/// Web Mercator latitude limit.
const MAX_LAT: f64 = 85.05112878;

/// Equatorial circumference in meters.
const EQUATOR_M: f64 = 40_075_016.686;

/// Minimum radius an upstream fetch covers, in meters.
pub const MIN_FETCH_RADIUS_M: f64 = 9_800.0;

/// A cell in the fixed-resolution hydration grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId {
    /// Web Mercator tile row (0 = north).
    pub row: u32,
    /// Web Mercator tile column (0 = west).
    pub col: u32,
}

impl CellId {
    /// Cell containing a coordinate. Latitude is clamped to the Web Mercator
    /// domain, longitude wraps.
    pub fn from_lat_lon(lat: f64, lon: f64) -> Self {
        let lat = lat.clamp(-MAX_LAT, MAX_LAT);
        let lon = ((lon + 180.0).rem_euclid(360.0)) - 180.0;
        let n = CELLS_PER_SIDE as f64;

        let col = ((lon + 180.0) / 360.0 * n) as u32;
        let lat_rad = lat.to_radians();
        let row = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n) as u32;

        Self {
            row: row.min(CELLS_PER_SIDE - 1),
            col: col.min(CELLS_PER_SIDE - 1),
        }
    }

    /// Geographic center of the cell.
    pub fn center(&self) -> (f64, f64) {
        let n = CELLS_PER_SIDE as f64;
        let lon = (self.col as f64 + 0.5) / n * 360.0 - 180.0;
        let y = (self.row as f64 + 0.5) / n;
        let lat = (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees();
        (lat, lon)
    }

    /// Stable storage key for this cell.
    pub fn key(&self) -> String {
        format!("z{}:{}:{}", CELL_ZOOM, self.row, self.col)
    }

    /// Side length of this cell in meters (latitude-dependent).
    pub fn side_m(&self) -> f64 {
        let (lat, _) = self.center();
        EQUATOR_M * lat.to_radians().cos() / CELLS_PER_SIDE as f64
    }

    /// Radius an upstream fetch from the center must cover so the whole cell
    /// is inside it.
    pub fn covering_radius_m(&self) -> f64 {
        let half_diagonal = self.side_m() * std::f64::consts::SQRT_2 / 2.0;
        (half_diagonal * 1.1).max(MIN_FETCH_RADIUS_M)
    }

    /// The eight surrounding cells. Columns wrap around the antimeridian;
    /// rows at the poles yield fewer neighbors.
    pub fn neighbors(&self) -> Vec<CellId> {
        let mut out = Vec::with_capacity(8);
        for drow in [-1i64, 0, 1] {
            for dcol in [-1i64, 0, 1] {
                if drow == 0 && dcol == 0 {
                    continue;
                }
                let row = self.row as i64 + drow;
                if row < 0 || row >= CELLS_PER_SIDE as i64 {
                    continue;
                }
                let col = (self.col as i64 + dcol).rem_euclid(CELLS_PER_SIDE as i64);
                out.push(CellId {
                    row: row as u32,
                    col: col as u32,
                });
            }
        }
        out
    }

    /// Distance from the cell center to a point, in meters.
    pub fn distance_to_m(&self, lat: f64, lon: f64) -> f64 {
        let (clat, clon) = self.center();
        haversine_m(clat, clon, lat, lon)
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}@Z{}", self.row, self.col, CELL_ZOOM)
    }
}
