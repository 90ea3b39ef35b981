//! POI table operations.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::poi::{Poi, PoiSource};
use crate::visibility::SizeClass;

use super::{bounding_box, placeholders, Store, StoreError};
use crate::geo::haversine_m;

fn size_from_tag(tag: &str) -> Option<SizeClass> {
    match tag {
        "S" => Some(SizeClass::S),
        "M" => Some(SizeClass::M),
        "L" => Some(SizeClass::L),
        "XL" => Some(SizeClass::XL),
        _ => None,
    }
}

/// Map a database row to a `Poi`. Rows with an empty QID violate the store
/// invariant and are rejected.
fn poi_from_row(row: &SqliteRow) -> Result<Poi, StoreError> {
    let qid: String = row.get("qid");
    if qid.is_empty() {
        return Err(StoreError::InvalidRecord {
            reason: "poi row with empty qid".to_string(),
        });
    }

    let mut poi = Poi::new(qid, row.get("lat"), row.get("lon"));
    poi.name = row.get("name");
    poi.altitude_m = row.get("altitude_m");
    poi.category = row.get("category");
    poi.subcategory = row.get("subcategory");
    poi.dimension_multiplier = row.get("dimension_multiplier");
    poi.sitelinks = row.get::<i64, _>("sitelinks") as u32;
    poi.article_len = row.get::<i64, _>("article_len") as u32;
    poi.source = PoiSource::from_tag(row.get("source"));
    poi.size = row
        .get::<Option<String>, _>("size")
        .as_deref()
        .and_then(size_from_tag);
    poi.created_at = row.get("created_at");
    poi.last_played = row.get("last_played");
    Ok(poi)
}

fn collect_pois(rows: Vec<SqliteRow>) -> Vec<Poi> {
    rows.iter()
        .filter_map(|row| match poi_from_row(row) {
            Ok(poi) => Some(poi),
            Err(e) => {
                tracing::error!(error = %e, "Dropping invalid poi row");
                None
            }
        })
        .collect()
}

const POI_COLUMNS: &str = "qid, name, lat, lon, altitude_m, category, subcategory, \
     dimension_multiplier, sitelinks, article_len, source, size, created_at, last_played";

impl Store {
    /// Fetch one POI by QID.
    pub async fn get_poi(&self, qid: &str) -> Result<Option<Poi>, StoreError> {
        let row = sqlx::query(&format!("SELECT {POI_COLUMNS} FROM poi WHERE qid = ?"))
            .bind(qid)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(poi_from_row).transpose()
    }

    /// Batch fetch by QID. Missing QIDs are simply absent from the result.
    pub async fn get_pois(&self, qids: &[String]) -> Result<Vec<Poi>, StoreError> {
        if qids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {POI_COLUMNS} FROM poi WHERE qid IN ({})",
            placeholders(qids.len())
        );
        let mut query = sqlx::query(&sql);
        for qid in qids {
            query = query.bind(qid);
        }
        Ok(collect_pois(query.fetch_all(self.pool()).await?))
    }

    /// Insert or replace a POI's durable fields.
    pub async fn save_poi(&self, poi: &Poi) -> Result<(), StoreError> {
        if poi.qid.is_empty() {
            return Err(StoreError::InvalidRecord {
                reason: "refusing to save poi with empty qid".to_string(),
            });
        }
        sqlx::query(
            "INSERT OR REPLACE INTO poi
             (qid, name, lat, lon, altitude_m, category, subcategory,
              dimension_multiplier, sitelinks, article_len, source, size,
              created_at, last_played)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&poi.qid)
        .bind(&poi.name)
        .bind(poi.lat)
        .bind(poi.lon)
        .bind(poi.altitude_m)
        .bind(&poi.category)
        .bind(&poi.subcategory)
        .bind(poi.dimension_multiplier)
        .bind(poi.sitelinks as i64)
        .bind(poi.article_len as i64)
        .bind(poi.source.as_str())
        .bind(poi.size.map(|s| s.as_str().to_string()))
        .bind(poi.created_at)
        .bind(poi.last_played)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// POIs narrated at or after the given instant.
    pub async fn recently_played_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Poi>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {POI_COLUMNS} FROM poi WHERE last_played IS NOT NULL AND last_played >= ?"
        ))
        .bind(since)
        .fetch_all(self.pool())
        .await?;
        Ok(collect_pois(rows))
    }

    /// Clear `last_played` for POIs within `radius_m` of a point.
    ///
    /// Bounding-box pre-filter in SQL, then precise haversine. Returns the
    /// number of rows cleared.
    pub async fn clear_last_played_within(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
    ) -> Result<u64, StoreError> {
        let (min_lat, max_lat, min_lon, max_lon) = bounding_box(lat, lon, radius_m);
        let rows = sqlx::query(
            "SELECT qid, lat, lon FROM poi
             WHERE last_played IS NOT NULL
               AND lat BETWEEN ? AND ? AND lon BETWEEN ? AND ?",
        )
        .bind(min_lat)
        .bind(max_lat)
        .bind(min_lon)
        .bind(max_lon)
        .fetch_all(self.pool())
        .await?;

        let targets: Vec<String> = rows
            .into_iter()
            .filter(|r| {
                haversine_m(lat, lon, r.get::<f64, _>("lat"), r.get::<f64, _>("lon")) <= radius_m
            })
            .map(|r| r.get::<String, _>("qid"))
            .collect();

        if targets.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "UPDATE poi SET last_played = NULL WHERE qid IN ({})",
            placeholders(targets.len())
        );
        let mut query = sqlx::query(&sql);
        for qid in &targets {
            query = query.bind(qid);
        }
        let result = query.execute(self.pool()).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn sample(qid: &str, lat: f64, lon: f64) -> Poi {
        let mut poi = Poi::new(qid, lat, lon);
        poi.name = format!("POI {qid}");
        poi.category = "Church".to_string();
        poi.sitelinks = 12;
        poi.article_len = 2_400;
        poi.size = Some(SizeClass::L);
        poi
    }

    #[tokio::test]
    async fn test_save_get_round_trip() {
        let store = Store::in_memory().await.unwrap();
        let mut poi = sample("Q42", 48.0, 7.85);
        poi.last_played = Some(Utc::now());
        store.save_poi(&poi).await.unwrap();

        let loaded = store.get_poi("Q42").await.unwrap().unwrap();
        assert_eq!(loaded.name, "POI Q42");
        assert_eq!(loaded.category, "Church");
        assert_eq!(loaded.sitelinks, 12);
        assert_eq!(loaded.article_len, 2_400);
        assert_eq!(loaded.size, Some(SizeClass::L));
        assert_eq!(loaded.source, PoiSource::Wikidata);
        assert!(loaded.last_played.is_some());
        // Volatile fields never round-trip
        assert_eq!(loaded.score, 0.0);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = Store::in_memory().await.unwrap();
        assert!(store.get_poi("Q404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_qid_rejected() {
        let store = Store::in_memory().await.unwrap();
        let poi = Poi::new("", 0.0, 0.0);
        assert!(matches!(
            store.save_poi(&poi).await,
            Err(StoreError::InvalidRecord { .. })
        ));
    }

    #[tokio::test]
    async fn test_batch_get() {
        let store = Store::in_memory().await.unwrap();
        store.save_poi(&sample("Q1", 48.0, 7.0)).await.unwrap();
        store.save_poi(&sample("Q2", 48.1, 7.1)).await.unwrap();

        let pois = store
            .get_pois(&["Q1".to_string(), "Q2".to_string(), "Q3".to_string()])
            .await
            .unwrap();
        assert_eq!(pois.len(), 2);
    }

    #[tokio::test]
    async fn test_batch_get_empty_input() {
        let store = Store::in_memory().await.unwrap();
        assert!(store.get_pois(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recently_played_since() {
        let store = Store::in_memory().await.unwrap();
        let now = Utc::now();

        let mut old = sample("Q1", 48.0, 7.0);
        old.last_played = Some(now - ChronoDuration::hours(48));
        store.save_poi(&old).await.unwrap();

        let mut recent = sample("Q2", 48.1, 7.1);
        recent.last_played = Some(now - ChronoDuration::minutes(10));
        store.save_poi(&recent).await.unwrap();

        store.save_poi(&sample("Q3", 48.2, 7.2)).await.unwrap();

        let played = store
            .recently_played_since(now - ChronoDuration::hours(24))
            .await
            .unwrap();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].qid, "Q2");
    }

    #[tokio::test]
    async fn test_clear_last_played_within_radius() {
        let store = Store::in_memory().await.unwrap();
        let now = Utc::now();

        // Inside (same point), inside (~7km), outside (~70km)
        for (qid, lat, lon) in [("Q1", 48.0, 7.0), ("Q2", 48.06, 7.0), ("Q3", 48.6, 7.0)] {
            let mut poi = sample(qid, lat, lon);
            poi.last_played = Some(now);
            store.save_poi(&poi).await.unwrap();
        }

        let cleared = store.clear_last_played_within(48.0, 7.0, 10_000.0).await.unwrap();
        assert_eq!(cleared, 2);
        assert!(store.get_poi("Q1").await.unwrap().unwrap().last_played.is_none());
        assert!(store.get_poi("Q2").await.unwrap().unwrap().last_played.is_none());
        assert!(store.get_poi("Q3").await.unwrap().unwrap().last_played.is_some());
    }

    #[tokio::test]
    async fn test_clear_last_played_no_matches() {
        let store = Store::in_memory().await.unwrap();
        let cleared = store.clear_last_played_within(0.0, 0.0, 1_000.0).await.unwrap();
        assert_eq!(cleared, 0);
    }
}
