//! SPARQL query construction and response parsing.
//!
//! The cheap tile query asks only for what the mapper needs: entity URI,
//! coordinates, sitelink count, instance-of URIs and physical dimensions.
//! Labels are deliberately absent; they are hydrated lazily through the
//! entity API and cached.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

/// Wikidata SPARQL endpoint.
pub const SPARQL_ENDPOINT: &str = "https://query.wikidata.org/sparql";

/// Provider key for backoff tracking.
pub const SPARQL_PROVIDER: &str = "wikidata-sparql";

/// Default per-call timeout for SPARQL queries.
pub const SPARQL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum SparqlError {
    #[error("malformed SPARQL response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One variable binding: we only ever need the value string.
#[derive(Debug, Clone, Deserialize)]
pub struct SparqlValue {
    pub value: String,
}

/// A result row: variable name -> binding.
pub type SparqlRow = HashMap<String, SparqlValue>;

#[derive(Debug, Deserialize)]
struct SparqlResults {
    bindings: Vec<SparqlRow>,
}

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

/// Compose the cheap around-point query.
///
/// `radius_km` is clamped to at least 9.8 km so a fetch always covers its
/// whole cell.
pub fn cheap_tile_query(lat: f64, lon: f64, radius_km: f64) -> String {
    let radius_km = radius_km.max(9.8);
    format!(
        r#"SELECT ?item ?location ?sitelinks ?instances ?area ?height ?length ?width WHERE {{
  SERVICE wikibase:around {{
    ?item wdt:P625 ?location .
    bd:serviceParam wikibase:center "Point({lon:.6} {lat:.6})"^^geo:wktLiteral .
    bd:serviceParam wikibase:radius "{radius_km:.2}" .
  }}
  OPTIONAL {{ ?item wikibase:sitelinks ?sitelinks . }}
  OPTIONAL {{ ?item wdt:P2046 ?area . }}
  OPTIONAL {{ ?item wdt:P2048 ?height . }}
  OPTIONAL {{ ?item wdt:P2043 ?length . }}
  OPTIONAL {{ ?item wdt:P2049 ?width . }}
  {{
    SELECT ?item (GROUP_CONCAT(DISTINCT STR(?inst); separator=",") AS ?instances) WHERE {{
      ?item wdt:P31 ?inst .
    }} GROUP BY ?item
  }}
}}"#
    )
}

/// Full request URL for a cheap tile query.
pub fn cheap_tile_query_url(lat: f64, lon: f64, radius_km: f64) -> String {
    let query = cheap_tile_query(lat, lon, radius_km);
    format!(
        "{SPARQL_ENDPOINT}?query={}&format=json",
        urlencode(&query)
    )
}

/// Headers every SPARQL request carries.
pub fn sparql_headers() -> Vec<(&'static str, String)> {
    vec![("Accept", "application/sparql-results+json".to_string())]
}

/// Parse a SPARQL JSON response into its binding rows.
pub fn parse_bindings(body: &[u8]) -> Result<Vec<SparqlRow>, SparqlError> {
    let response: SparqlResponse = serde_json::from_slice(body)?;
    Ok(response.results.bindings)
}

/// Minimal percent-encoding for query strings.
pub(crate) fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_contains_center_and_radius() {
        let q = cheap_tile_query(48.05, 7.85, 12.0);
        assert!(q.contains("Point(7.850000 48.050000)"));
        assert!(q.contains("\"12.00\""));
    }

    #[test]
    fn test_radius_floor() {
        let q = cheap_tile_query(48.0, 7.0, 2.0);
        assert!(q.contains("\"9.80\""));
    }

    #[test]
    fn test_query_is_cheap() {
        // No labels, no titles: those hydrate lazily
        let q = cheap_tile_query(48.0, 7.0, 10.0);
        assert!(!q.to_lowercase().contains("label"));
        assert!(!q.to_lowercase().contains("title"));
    }

    #[test]
    fn test_url_format() {
        let url = cheap_tile_query_url(48.0, 7.0, 10.0);
        assert!(url.starts_with("https://query.wikidata.org/sparql?query="));
        assert!(url.ends_with("&format=json"));
        assert!(!url.contains(' '));
    }

    #[test]
    fn test_parse_bindings() {
        let body = br#"{
          "head": {"vars": ["item", "location"]},
          "results": {"bindings": [
            {
              "item": {"type": "uri", "value": "http://www.wikidata.org/entity/Q4917"},
              "location": {"type": "literal", "value": "Point(7.85 48.0)"}
            }
          ]}
        }"#;
        let rows = parse_bindings(body).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0]["item"].value,
            "http://www.wikidata.org/entity/Q4917"
        );
    }

    #[test]
    fn test_parse_empty_results() {
        let body = br#"{"results": {"bindings": []}}"#;
        assert!(parse_bindings(body).unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_bindings(b"<html>rate limited</html>"),
            Err(SparqlError::Malformed(_))
        ));
    }

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode("a b"), "a%20b");
        assert_eq!(urlencode("SELECT ?x"), "SELECT%20%3Fx");
        assert_eq!(urlencode("safe-._~"), "safe-._~");
    }
}
