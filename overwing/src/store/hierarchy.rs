//! Wikidata hierarchy table: cached instance-of/subclass walks.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{placeholders, Store, StoreError};

/// Cached classification of one Wikidata entity.
#[derive(Debug, Clone)]
pub struct HierarchyRecord {
    pub qid: String,
    pub name: String,
    /// Category the ruleset assigned; empty is a valid "no category" entry.
    pub category: String,
    pub parents: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn record_from_row(row: &SqliteRow) -> Result<HierarchyRecord, StoreError> {
    let parents_json: String = row.get("parents");
    Ok(HierarchyRecord {
        qid: row.get("qid"),
        name: row.get("name"),
        category: row.get("category"),
        parents: serde_json::from_str(&parents_json)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

impl Store {
    /// Fetch one hierarchy record.
    pub async fn get_hierarchy(&self, qid: &str) -> Result<Option<HierarchyRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT qid, name, category, parents, created_at, updated_at
             FROM wikidata_hierarchy WHERE qid = ?",
        )
        .bind(qid)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    /// Batch fetch hierarchy records.
    pub async fn get_hierarchies(
        &self,
        qids: &[String],
    ) -> Result<Vec<HierarchyRecord>, StoreError> {
        if qids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT qid, name, category, parents, created_at, updated_at
             FROM wikidata_hierarchy WHERE qid IN ({})",
            placeholders(qids.len())
        );
        let mut query = sqlx::query(&sql);
        for qid in qids {
            query = query.bind(qid);
        }
        let rows = query.fetch_all(self.pool()).await?;
        rows.iter().map(record_from_row).collect()
    }

    /// Upsert a full record.
    pub async fn save_hierarchy(&self, record: &HierarchyRecord) -> Result<(), StoreError> {
        let parents = serde_json::to_string(&record.parents)?;
        sqlx::query(
            "INSERT OR REPLACE INTO wikidata_hierarchy
             (qid, name, category, parents, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.qid)
        .bind(&record.name)
        .bind(&record.category)
        .bind(parents)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Upsert a classification result, bumping `updated_at` to now and
    /// preserving `created_at` for existing rows.
    pub async fn save_classification(
        &self,
        qid: &str,
        category: &str,
        parents: &[String],
        name: &str,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let parents_json = serde_json::to_string(parents)?;
        sqlx::query(
            "INSERT INTO wikidata_hierarchy
             (qid, name, category, parents, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(qid) DO UPDATE SET
               name = excluded.name,
               category = excluded.category,
               parents = excluded.parents,
               updated_at = excluded.updated_at",
        )
        .bind(qid)
        .bind(name)
        .bind(category)
        .bind(parents_json)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
