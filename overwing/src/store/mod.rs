//! Persistent store over SQLite.
//!
//! One `Store` handle wraps a connection pool and exposes the sub-interfaces
//! the engine needs: POI rows, a gzip-transparent KV cache, the geodata cache
//! with authoritative radius metadata, the classification hierarchy, article
//! records, the seen-entities negative cache, MSFS POIs and the
//! `persistent_state` live-config table.
//!
//! Every operation returns a `StoreError`; the only place errors are
//! swallowed is the KV cache read path, where any failure is a miss.

mod article;
mod geodata;
mod kv;
mod msfs;
mod poi;
mod schema;
mod seen;
mod state;

pub use article::ArticleRecord;
pub use geodata::GeodataRecord;
pub use msfs::MsfsPoi;

mod hierarchy;
pub use hierarchy::HierarchyRecord;

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A row violated an invariant (e.g. an empty QID).
    #[error("invalid record: {reason}")]
    InvalidRecord { reason: String },
}

/// Handle to the SQLite-backed persistent store.
///
/// Cloneable; clones share the underlying pool. Safe for concurrent use —
/// this is the system's single serialization point for durable state.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database, for tests and bring-up.
    ///
    /// A single connection keeps the in-memory database alive and shared.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in schema::STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Build an `IN (?, ?, ...)` placeholder list for `n` binds.
pub(crate) fn placeholders(n: usize) -> String {
    let mut s = String::with_capacity(n * 2);
    for i in 0..n {
        if i > 0 {
            s.push(',');
        }
        s.push('?');
    }
    s
}

/// Bounding box with `radius_m` of slack around a center point.
///
/// Degenerate near the poles; callers operate well inside ±85° latitude.
pub(crate) fn bounding_box(lat: f64, lon: f64, radius_m: f64) -> (f64, f64, f64, f64) {
    let dlat = radius_m / 111_320.0;
    let dlon = radius_m / (111_320.0 * lat.to_radians().cos().max(0.01));
    (lat - dlat, lat + dlat, lon - dlon, lon + dlon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(0), "");
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?,?,?");
    }

    #[test]
    fn test_bounding_box_contains_radius() {
        let (min_lat, max_lat, min_lon, max_lon) = bounding_box(48.0, 7.0, 10_000.0);
        assert!(min_lat < 48.0 && max_lat > 48.0);
        assert!(min_lon < 7.0 && max_lon > 7.0);
        // ~10km of latitude is ~0.09 degrees
        assert!((max_lat - 48.0 - 0.0898).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_in_memory_schema_initializes() {
        let store = Store::in_memory().await.unwrap();
        // A second init is harmless
        store.init_schema().await.unwrap();
    }
}
