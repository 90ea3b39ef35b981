//! Persistent-state table: the live runtime config channel.
//!
//! Readers consult it per request, writers publish synchronously. Values are
//! plain strings; typed accessors parse on the way out and fall back to the
//! supplied default on absence or parse failure.

use std::str::FromStr;

use sqlx::Row;

use super::{Store, StoreError};

impl Store {
    /// Fetch a state value.
    pub async fn state_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM persistent_state WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    /// Set a state value.
    pub async fn state_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO persistent_state (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Delete a state value.
    pub async fn state_delete(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM persistent_state WHERE key = ?")
            .bind(key)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Typed read with a default for missing or unparseable values.
    pub async fn state_get_or<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.state_get(key).await {
            Ok(Some(value)) => value.parse().unwrap_or(default),
            _ => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = Store::in_memory().await.unwrap();
        assert!(store.state_get("mode").await.unwrap().is_none());

        store.state_set("mode", "adaptive").await.unwrap();
        assert_eq!(store.state_get("mode").await.unwrap().unwrap(), "adaptive");

        store.state_set("mode", "fixed").await.unwrap();
        assert_eq!(store.state_get("mode").await.unwrap().unwrap(), "fixed");

        store.state_delete("mode").await.unwrap();
        assert!(store.state_get("mode").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_typed_read() {
        let store = Store::in_memory().await.unwrap();
        store.state_set("min_score", "0.25").await.unwrap();
        let v: f64 = store.state_get_or("min_score", 0.1).await;
        assert_eq!(v, 0.25);

        let missing: f64 = store.state_get_or("absent", 0.1).await;
        assert_eq!(missing, 0.1);

        store.state_set("min_score", "not-a-number").await.unwrap();
        let fallback: f64 = store.state_get_or("min_score", 0.1).await;
        assert_eq!(fallback, 0.1);
    }
}
