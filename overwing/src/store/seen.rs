//! Seen-entities negative cache.
//!
//! Records (qid, instance) pairs the mapper has already looked at so repeated
//! tile fetches do not re-process known entities.

use std::collections::HashMap;

use sqlx::Row;

use super::{placeholders, Store, StoreError};

impl Store {
    /// Batch lookup: QID -> list of instance QIDs it was seen with.
    pub async fn get_seen_entities(
        &self,
        qids: &[String],
    ) -> Result<HashMap<String, Vec<String>>, StoreError> {
        if qids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "SELECT qid, instance FROM seen_entities WHERE qid IN ({})",
            placeholders(qids.len())
        );
        let mut query = sqlx::query(&sql);
        for qid in qids {
            query = query.bind(qid);
        }
        let rows = query.fetch_all(self.pool()).await?;

        let mut out: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            out.entry(row.get("qid"))
                .or_default()
                .push(row.get("instance"));
        }
        Ok(out)
    }

    /// Insert pairs, ignoring conflicts.
    pub async fn mark_entities_seen(
        &self,
        pairs: &[(String, String)],
    ) -> Result<(), StoreError> {
        for (qid, instance) in pairs {
            sqlx::query("INSERT OR IGNORE INTO seen_entities (qid, instance) VALUES (?, ?)")
                .bind(qid)
                .bind(instance)
                .execute(self.pool())
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_and_get() {
        let store = Store::in_memory().await.unwrap();
        store
            .mark_entities_seen(&[
                ("Q1".to_string(), "Q16970".to_string()),
                ("Q1".to_string(), "Q811979".to_string()),
                ("Q2".to_string(), "Q23397".to_string()),
            ])
            .await
            .unwrap();

        let seen = store
            .get_seen_entities(&["Q1".to_string(), "Q2".to_string(), "Q3".to_string()])
            .await
            .unwrap();
        assert_eq!(seen["Q1"].len(), 2);
        assert_eq!(seen["Q2"], vec!["Q23397".to_string()]);
        assert!(!seen.contains_key("Q3"));
    }

    #[tokio::test]
    async fn test_duplicate_insert_ignored() {
        let store = Store::in_memory().await.unwrap();
        let pair = [("Q1".to_string(), "Q16970".to_string())];
        store.mark_entities_seen(&pair).await.unwrap();
        store.mark_entities_seen(&pair).await.unwrap();

        let seen = store.get_seen_entities(&["Q1".to_string()]).await.unwrap();
        assert_eq!(seen["Q1"].len(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let store = Store::in_memory().await.unwrap();
        assert!(store.get_seen_entities(&[]).await.unwrap().is_empty());
        store.mark_entities_seen(&[]).await.unwrap();
    }
}
