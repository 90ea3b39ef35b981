//! Simulator-native POIs.
//!
//! MSFS ships hand-placed landmarks; they get a large scoring bonus and their
//! own table with auto-assigned ids.

use sqlx::Row;

use crate::geo::haversine_m;

use super::{bounding_box, Store, StoreError};

/// A simulator-native landmark.
#[derive(Debug, Clone)]
pub struct MsfsPoi {
    pub id: i64,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub category: String,
}

impl Store {
    /// Save a landmark, returning its assigned id.
    pub async fn save_msfs_poi(
        &self,
        name: &str,
        lat: f64,
        lon: f64,
        category: &str,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO msfs_poi (name, lat, lon, category) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(lat)
        .bind(lon)
        .bind(category)
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Fetch a landmark by id.
    pub async fn get_msfs_poi(&self, id: i64) -> Result<Option<MsfsPoi>, StoreError> {
        let row = sqlx::query("SELECT id, name, lat, lon, category FROM msfs_poi WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(|r| MsfsPoi {
            id: r.get("id"),
            name: r.get("name"),
            lat: r.get("lat"),
            lon: r.get("lon"),
            category: r.get("category"),
        }))
    }

    /// Whether any landmark lies within `radius_m` of the point.
    ///
    /// Bounding-box pre-filter, then precise haversine.
    pub async fn check_msfs_poi(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
    ) -> Result<bool, StoreError> {
        let (min_lat, max_lat, min_lon, max_lon) = bounding_box(lat, lon, radius_m);
        let rows = sqlx::query(
            "SELECT lat, lon FROM msfs_poi
             WHERE lat BETWEEN ? AND ? AND lon BETWEEN ? AND ?",
        )
        .bind(min_lat)
        .bind(max_lat)
        .bind(min_lon)
        .bind(max_lon)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().any(|r| {
            haversine_m(lat, lon, r.get::<f64, _>("lat"), r.get::<f64, _>("lon")) <= radius_m
        }))
    }
}
