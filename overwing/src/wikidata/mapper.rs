//! SPARQL row mapper.
//!
//! Turns a cheap-query binding row into a POI skeleton plus its instance-of
//! QIDs. Malformed rows are dropped with a log line; a tile hydrated from a
//! partially bad payload simply carries fewer POIs.

use std::sync::OnceLock;

use regex::Regex;

use crate::poi::{Poi, PoiSource};

use super::sparql::SparqlRow;

/// Cap on the dimension multiplier.
const DIMENSION_MULTIPLIER_CAP: f64 = 5.0;

/// A mapped POI skeleton and the instance-of QIDs used for classification.
#[derive(Debug, Clone)]
pub struct MappedPoi {
    pub poi: Poi,
    pub instances: Vec<String>,
}

fn qid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(Q\d+)$").expect("valid regex"))
}

fn point_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^Point\(([-+0-9.eE]+)\s+([-+0-9.eE]+)\)$").expect("valid regex")
    })
}

/// Extract the trailing QID from an entity URI.
pub fn extract_qid(uri: &str) -> Option<String> {
    qid_regex()
        .captures(uri.trim())
        .map(|c| c[1].to_string())
}

/// Parse a WKT-style `Point(lon lat)` literal.
pub fn parse_point(literal: &str) -> Option<(f64, f64)> {
    let caps = point_regex().captures(literal.trim())?;
    let lon: f64 = caps[1].parse().ok()?;
    let lat: f64 = caps[2].parse().ok()?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    Some((lat, lon))
}

/// Monotone multiplier from the largest present physical dimension.
///
/// Area (m²) dominates when present: `1 + log10(1 + area/10^4)`. Linear
/// dimensions (m) use `1 + log10(1 + v/100)`. Capped at 5.0.
pub fn dimension_multiplier(
    area_m2: Option<f64>,
    height_m: Option<f64>,
    length_m: Option<f64>,
    width_m: Option<f64>,
) -> f64 {
    let raw = if let Some(area) = area_m2.filter(|a| *a > 0.0) {
        1.0 + (1.0 + area / 10_000.0).log10()
    } else {
        let linear = [height_m, length_m, width_m]
            .into_iter()
            .flatten()
            .fold(0.0_f64, f64::max);
        if linear <= 0.0 {
            return 1.0;
        }
        1.0 + (1.0 + linear / 100.0).log10()
    };
    raw.min(DIMENSION_MULTIPLIER_CAP)
}

fn numeric(row: &SparqlRow, var: &str) -> Option<f64> {
    row.get(var).and_then(|v| v.value.parse().ok())
}

/// Map a binding row to a POI skeleton.
///
/// Returns `None` (after logging) when the row is missing its entity URI or
/// has an unparseable location.
pub fn map_row(row: &SparqlRow) -> Option<MappedPoi> {
    let item = row.get("item")?;
    let Some(qid) = extract_qid(&item.value) else {
        tracing::debug!(uri = %item.value, "Dropping row with unrecognized entity URI");
        return None;
    };

    let Some((lat, lon)) = row.get("location").and_then(|v| parse_point(&v.value)) else {
        tracing::debug!(qid, "Dropping row with missing or malformed location");
        return None;
    };

    let mut poi = Poi::new(qid, lat, lon);
    poi.source = PoiSource::Wikidata;
    poi.sitelinks = numeric(row, "sitelinks").map(|v| v as u32).unwrap_or(0);
    poi.dimension_multiplier = dimension_multiplier(
        numeric(row, "area"),
        numeric(row, "height"),
        numeric(row, "length"),
        numeric(row, "width"),
    );

    let instances = row
        .get("instances")
        .map(|v| {
            v.value
                .split(',')
                .filter_map(extract_qid)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Some(MappedPoi { poi, instances })
}

/// Map all rows, dropping the malformed ones.
pub fn map_rows(rows: &[SparqlRow]) -> Vec<MappedPoi> {
    rows.iter().filter_map(map_row).collect()
}
