//! Altitude/size visibility table.
//!
//! Maps altitude above ground to the maximum distance (nautical miles) at
//! which an object of a given display size is worth pointing out. Loaded from
//! the visibility YAML table the embedding application provides.

use std::collections::HashMap;

use serde::Deserialize;

use crate::config::ConfigError;

/// Display size class of a POI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum SizeClass {
    S,
    #[default]
    M,
    L,
    XL,
}

impl SizeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeClass::S => "S",
            SizeClass::M => "M",
            SizeClass::L => "L",
            SizeClass::XL => "XL",
        }
    }
}

impl std::fmt::Display for SizeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One table row: at `altitude_agl_ft`, each size class is visible out to the
/// given range in nautical miles.
#[derive(Debug, Clone, Deserialize)]
pub struct VisibilityRow {
    pub altitude_agl_ft: f64,
    pub ranges: HashMap<SizeClass, f64>,
}

/// Ordered altitude table with piecewise-linear interpolation.
#[derive(Debug, Clone)]
pub struct VisibilityTable {
    rows: Vec<VisibilityRow>,
}

impl VisibilityTable {
    /// Build a table from rows, sorting by altitude.
    ///
    /// Returns `ConfigError::InvalidValue` for an empty table.
    pub fn new(mut rows: Vec<VisibilityRow>) -> Result<Self, ConfigError> {
        if rows.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "visibility table",
                value: "empty".to_string(),
            });
        }
        rows.sort_by(|a, b| a.altitude_agl_ft.total_cmp(&b.altitude_agl_ft));
        Ok(Self { rows })
    }

    /// Parse the visibility YAML document (a sequence of rows).
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let rows: Vec<VisibilityRow> =
            serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
                what: "visibility table",
                source,
            })?;
        Self::new(rows)
    }

    /// A small built-in table for tests and bring-up.
    pub fn builtin() -> Self {
        let mk = |s: f64, m: f64, l: f64, xl: f64| {
            HashMap::from([
                (SizeClass::S, s),
                (SizeClass::M, m),
                (SizeClass::L, l),
                (SizeClass::XL, xl),
            ])
        };
        Self::new(vec![
            VisibilityRow {
                altitude_agl_ft: 500.0,
                ranges: mk(1.0, 3.0, 5.0, 8.0),
            },
            VisibilityRow {
                altitude_agl_ft: 1_000.0,
                ranges: mk(2.0, 5.0, 8.0, 12.0),
            },
            VisibilityRow {
                altitude_agl_ft: 3_000.0,
                ranges: mk(3.0, 8.0, 12.0, 20.0),
            },
            VisibilityRow {
                altitude_agl_ft: 10_000.0,
                ranges: mk(5.0, 12.0, 20.0, 35.0),
            },
            VisibilityRow {
                altitude_agl_ft: 30_000.0,
                ranges: mk(6.0, 15.0, 30.0, 60.0),
            },
        ])
        .expect("builtin table is non-empty")
    }

    /// Maximum visible distance in nautical miles for a size at an altitude,
    /// scaled by `boost`.
    ///
    /// Piecewise-linear between rows; below the first row the first row's
    /// value applies, above the last row the last row's. A size missing from
    /// a row falls back to that row's M entry.
    pub fn max_visible_dist_nm(&self, alt_agl_ft: f64, size: SizeClass, boost: f64) -> f64 {
        self.base_dist_nm(alt_agl_ft, size) * boost
    }

    fn row_value(row: &VisibilityRow, size: SizeClass) -> f64 {
        row.ranges
            .get(&size)
            .or_else(|| row.ranges.get(&SizeClass::M))
            .copied()
            .unwrap_or(0.0)
    }

    fn base_dist_nm(&self, alt_agl_ft: f64, size: SizeClass) -> f64 {
        let first = self.rows.first().expect("table is non-empty");
        if alt_agl_ft <= first.altitude_agl_ft {
            return Self::row_value(first, size);
        }
        let last = self.rows.last().expect("table is non-empty");
        if alt_agl_ft >= last.altitude_agl_ft {
            return Self::row_value(last, size);
        }

        for pair in self.rows.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            if alt_agl_ft >= lo.altitude_agl_ft && alt_agl_ft <= hi.altitude_agl_ft {
                let span = hi.altitude_agl_ft - lo.altitude_agl_ft;
                if span <= 0.0 {
                    return Self::row_value(hi, size);
                }
                let t = (alt_agl_ft - lo.altitude_agl_ft) / span;
                let v_lo = Self::row_value(lo, size);
                let v_hi = Self::row_value(hi, size);
                return v_lo + (v_hi - v_lo) * t;
            }
        }

        Self::row_value(last, size)
    }

    /// Altitude of the highest configured row, in feet AGL.
    pub fn max_altitude_ft(&self) -> f64 {
        self.rows.last().map(|r| r.altitude_agl_ft).unwrap_or(0.0)
    }
}
