//! Regional category registry.
//!
//! Operators can inject per-area classification overrides at runtime, e.g.
//! mapping shinto shrines to "Sights" while touring Japan. Overrides are
//! keyed by ancestor QID and carry an optional human label for display.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::store::Store;

/// One injected override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionalCategory {
    pub qid: String,
    pub category: String,
    /// Optional operator-supplied display label.
    pub label: Option<String>,
}

/// An override with its display name resolved for API consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionalCategoryView {
    pub qid: String,
    pub category: String,
    pub display_name: String,
}

/// Registry of live regional overrides.
#[derive(Debug, Default)]
pub struct RegionalRegistry {
    rules: RwLock<HashMap<String, RegionalCategory>>,
}

impl RegionalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject or replace an override.
    pub fn inject(&self, qid: &str, category: &str, label: Option<&str>) {
        let rule = RegionalCategory {
            qid: qid.to_string(),
            category: category.to_string(),
            label: label.map(String::from),
        };
        tracing::info!(qid, category, "Regional category override injected");
        self.rules.write().insert(qid.to_string(), rule);
    }

    /// Remove an override. Returns whether it existed.
    pub fn remove(&self, qid: &str) -> bool {
        self.rules.write().remove(qid).is_some()
    }

    /// Category override for a QID, if present.
    pub fn category_for(&self, qid: &str) -> Option<String> {
        self.rules.read().get(qid).map(|r| r.category.clone())
    }

    /// Number of live overrides.
    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// List overrides with display names resolved: the injected label when
    /// present, otherwise the hierarchy table's name, otherwise the QID.
    pub async fn list(&self, store: &Store) -> Vec<RegionalCategoryView> {
        let rules: Vec<RegionalCategory> = self.rules.read().values().cloned().collect();

        let mut views = Vec::with_capacity(rules.len());
        for rule in rules {
            let display_name = match &rule.label {
                Some(label) => label.clone(),
                None => match store.get_hierarchy(&rule.qid).await {
                    Ok(Some(record)) if !record.name.is_empty() => record.name,
                    _ => rule.qid.clone(),
                },
            };
            views.push(RegionalCategoryView {
                qid: rule.qid,
                category: rule.category,
                display_name,
            });
        }
        views.sort_by(|a, b| a.qid.cmp(&b.qid));
        views
    }
}
