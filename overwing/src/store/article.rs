//! Wikipedia article records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::{Store, StoreError};

/// Article metadata keyed by a stable UUID, with per-language name and
/// length maps.
#[derive(Debug, Clone)]
pub struct ArticleRecord {
    pub id: Uuid,
    /// Language code -> article title.
    pub names: HashMap<String, String>,
    /// Language code -> character count.
    pub lengths: HashMap<String, u32>,
    pub updated_at: DateTime<Utc>,
}

impl ArticleRecord {
    /// New empty record with a fresh UUID.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            names: HashMap::new(),
            lengths: HashMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Length of the English article, 0 if unknown.
    pub fn english_length(&self) -> u32 {
        self.lengths.get("en").copied().unwrap_or(0)
    }
}

impl Default for ArticleRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Fetch an article record by UUID.
    pub async fn get_article(&self, id: Uuid) -> Result<Option<ArticleRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, names, lengths, updated_at FROM wikipedia_articles WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id_text: String = row.get("id");
        let id = Uuid::parse_str(&id_text).map_err(|e| StoreError::InvalidRecord {
            reason: format!("article id is not a uuid: {e}"),
        })?;
        let names: String = row.get("names");
        let lengths: String = row.get("lengths");
        Ok(Some(ArticleRecord {
            id,
            names: serde_json::from_str(&names)?,
            lengths: serde_json::from_str(&lengths)?,
            updated_at: row.get("updated_at"),
        }))
    }

    /// Insert or replace an article record.
    pub async fn save_article(&self, record: &ArticleRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO wikipedia_articles (id, names, lengths, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(serde_json::to_string(&record.names)?)
        .bind(serde_json::to_string(&record.lengths)?)
        .bind(record.updated_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
