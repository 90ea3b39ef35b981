//! Geodata cache: persisted tile fetches with coverage metadata.
//!
//! Each record mirrors one upstream fetch: the raw payload (gzip) plus the
//! center and radius it covered. The radius is authoritative — a lookup for a
//! point only hits when the stored radius is at least the required one.

use sqlx::Row;

use super::kv::{compress, decompress_transparent};
use super::{Store, StoreError};

/// Coverage metadata of a persisted tile fetch (payload omitted).
#[derive(Debug, Clone)]
pub struct GeodataRecord {
    pub key: String,
    pub lat: f64,
    pub lon: f64,
    pub radius_m: f64,
}

impl Store {
    /// Persist a fetch payload with its coverage center and radius.
    pub async fn geodata_set(
        &self,
        key: &str,
        payload: &[u8],
        radius_m: f64,
        lat: f64,
        lon: f64,
    ) -> Result<(), StoreError> {
        let compressed = compress(payload);
        sqlx::query(
            "INSERT OR REPLACE INTO cache_geodata (key, lat, lon, radius_m, data)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(key)
        .bind(lat)
        .bind(lon)
        .bind(radius_m)
        .bind(compressed)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Fetch a payload and its covering radius. `None` on miss or any error.
    pub async fn geodata_get(&self, key: &str) -> Option<(Vec<u8>, f64)> {
        let row = match sqlx::query("SELECT data, radius_m FROM cache_geodata WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await
        {
            Ok(row) => row?,
            Err(e) => {
                tracing::warn!(key, error = %e, "Geodata read failed, treating as miss");
                return None;
            }
        };
        let data: Vec<u8> = row.get(0);
        let radius_m: f64 = row.get(1);
        Some((decompress_transparent(data), radius_m))
    }

    /// Coverage records whose centers fall inside the bounding box.
    pub async fn geodata_in_bounds(
        &self,
        min_lat: f64,
        max_lat: f64,
        min_lon: f64,
        max_lon: f64,
    ) -> Result<Vec<GeodataRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT key, lat, lon, radius_m FROM cache_geodata
             WHERE lat BETWEEN ? AND ? AND lon BETWEEN ? AND ?",
        )
        .bind(min_lat)
        .bind(max_lat)
        .bind(min_lon)
        .bind(max_lon)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| GeodataRecord {
                key: r.get(0),
                lat: r.get(1),
                lon: r.get(2),
                radius_m: r.get(3),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_round_trip() {
        let store = Store::in_memory().await.unwrap();
        store
            .geodata_set("cell:1", b"{\"bindings\":[]}", 9_800.0, 48.0, 7.0)
            .await
            .unwrap();

        let (payload, radius) = store.geodata_get("cell:1").await.unwrap();
        assert_eq!(payload, b"{\"bindings\":[]}");
        assert_eq!(radius, 9_800.0);
    }

    #[tokio::test]
    async fn test_miss() {
        let store = Store::in_memory().await.unwrap();
        assert!(store.geodata_get("cell:unknown").await.is_none());
    }

    #[tokio::test]
    async fn test_in_bounds_filters() {
        let store = Store::in_memory().await.unwrap();
        store.geodata_set("a", b"x", 10_000.0, 48.0, 7.0).await.unwrap();
        store.geodata_set("b", b"x", 10_000.0, 48.1, 7.1).await.unwrap();
        store.geodata_set("c", b"x", 10_000.0, 55.0, 20.0).await.unwrap();

        let records = store.geodata_in_bounds(47.9, 48.2, 6.9, 7.2).await.unwrap();
        let mut keys: Vec<_> = records.iter().map(|r| r.key.as_str()).collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_radius_metadata_preserved() {
        let store = Store::in_memory().await.unwrap();
        store.geodata_set("a", b"x", 12_345.0, 48.0, 7.0).await.unwrap();
        let records = store.geodata_in_bounds(47.0, 49.0, 6.0, 8.0).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].radius_m, 12_345.0);
    }

    #[tokio::test]
    async fn test_overwrite_updates_radius() {
        let store = Store::in_memory().await.unwrap();
        store.geodata_set("a", b"x", 9_800.0, 48.0, 7.0).await.unwrap();
        store.geodata_set("a", b"y", 15_000.0, 48.0, 7.0).await.unwrap();
        let (payload, radius) = store.geodata_get("a").await.unwrap();
        assert_eq!(payload, b"y");
        assert_eq!(radius, 15_000.0);
    }
}
