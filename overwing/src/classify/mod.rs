//! Category classification via the Wikidata type hierarchy.
//!
//! A POI's cheap-query row carries its instance-of QIDs. The classifier walks
//! those nodes up the subclass chain until a ruleset entry matches, caching
//! every visited node (name, parents, resolved category) in the hierarchy
//! table. The hierarchy is a DAG that occasionally contains cycles upstream;
//! the walk carries a visited set and a depth bound so cost stays bounded
//! either way.

mod regional;

pub use regional::{RegionalCategory, RegionalCategoryView, RegionalRegistry};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::provider::{BoxFuture, ClientError};
use crate::store::{Store, StoreError};
use crate::wikidata::{EntityApi, EntityNode};

/// Maximum subclass-chain depth the walk will follow.
const MAX_WALK_DEPTH: usize = 5;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Upstream(#[from] ClientError),
}

/// Source of classification nodes; the entity API in production.
pub trait NodeSource: Send + Sync {
    fn fetch_nodes<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        qids: &'a [String],
    ) -> BoxFuture<'a, Result<HashMap<String, EntityNode>, ClientError>>;
}

impl NodeSource for EntityApi {
    fn fetch_nodes<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        qids: &'a [String],
    ) -> BoxFuture<'a, Result<HashMap<String, EntityNode>, ClientError>> {
        Box::pin(EntityApi::fetch_nodes(self, cancel, qids))
    }
}

/// Configured mapping from ancestor QIDs to category labels.
#[derive(Debug, Clone)]
pub struct CategoryRuleset {
    rules: HashMap<String, String>,
    loaded_at: DateTime<Utc>,
}

impl CategoryRuleset {
    pub fn new(rules: HashMap<String, String>) -> Self {
        Self {
            rules,
            loaded_at: Utc::now(),
        }
    }

    /// Build from (parent QID, category) pairs.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(q, c)| (q.to_string(), c.to_string()))
                .collect(),
        )
    }

    /// Direct category for a node, if configured.
    pub fn category_for(&self, qid: &str) -> Option<&str> {
        self.rules.get(qid).map(String::as_str)
    }

    /// When this ruleset became active. Cached classifications older than
    /// this are recomputed.
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

#[derive(Debug, Clone)]
struct CachedNode {
    category: String,
    parents: Vec<String>,
}

/// The classifier: ruleset + regional overrides + two cache tiers.
pub struct Classifier {
    store: Store,
    source: Arc<dyn NodeSource>,
    ruleset: CategoryRuleset,
    regional: Arc<RegionalRegistry>,
    /// Hot in-process tier over the hierarchy table.
    cache: DashMap<String, CachedNode>,
}

impl Classifier {
    pub fn new(
        store: Store,
        source: Arc<dyn NodeSource>,
        ruleset: CategoryRuleset,
        regional: Arc<RegionalRegistry>,
    ) -> Self {
        Self {
            store,
            source,
            ruleset,
            regional,
            cache: DashMap::new(),
        }
    }

    /// Regional registry handle.
    pub fn regional(&self) -> &Arc<RegionalRegistry> {
        &self.regional
    }

    /// Classify an entity by its instance-of QIDs. Returns the category, or
    /// an empty string when nothing in the hierarchy matches.
    pub async fn classify(
        &self,
        cancel: &CancellationToken,
        instances: &[String],
    ) -> Result<String, ClassifyError> {
        let mut visited = HashSet::new();
        for instance in instances {
            let category = self.walk(cancel, instance, 0, &mut visited).await?;
            if !category.is_empty() {
                return Ok(category);
            }
        }
        Ok(String::new())
    }

    /// Classify a batch of (qid, instances) pairs, returning qid -> category.
    pub async fn classify_batch(
        &self,
        cancel: &CancellationToken,
        entities: &[(String, Vec<String>)],
    ) -> Result<HashMap<String, String>, ClassifyError> {
        let mut out = HashMap::with_capacity(entities.len());
        for (qid, instances) in entities {
            let category = self.classify(cancel, instances).await?;
            out.insert(qid.clone(), category);
        }
        Ok(out)
    }

    /// Resolve one node's walk result, depth-first through its parents.
    fn walk<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        qid: &'a str,
        depth: usize,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<String, ClassifyError>> {
        Box::pin(async move {
            if depth > MAX_WALK_DEPTH || !visited.insert(qid.to_string()) {
                return Ok(String::new());
            }

            // Regional overrides come first: an operator injection beats the
            // static ruleset.
            if let Some(category) = self.regional.category_for(qid) {
                return Ok(category);
            }

            if let Some(cached) = self.lookup_cached(qid).await? {
                if !cached.category.is_empty() {
                    return Ok(cached.category);
                }
                // A fresh empty entry means the whole subtree was already
                // walked without a match.
                return Ok(String::new());
            }

            if let Some(category) = self.ruleset.category_for(qid) {
                self.remember(qid, category, &[], "").await?;
                return Ok(category.to_string());
            }

            let wanted = [qid.to_string()];
            let nodes = self.source.fetch_nodes(cancel, &wanted).await?;
            let node = nodes.get(qid).cloned().unwrap_or_default();

            let mut category = String::new();
            for parent in &node.parents {
                let found = self.walk(cancel, parent, depth + 1, visited).await?;
                if !found.is_empty() {
                    category = found;
                    break;
                }
            }

            self.remember(qid, &category, &node.parents, &node.name)
                .await?;
            Ok(category)
        })
    }

    /// Fetch from the hot cache or the hierarchy table, honoring ruleset age.
    async fn lookup_cached(&self, qid: &str) -> Result<Option<CachedNode>, ClassifyError> {
        if let Some(entry) = self.cache.get(qid) {
            return Ok(Some(entry.clone()));
        }
        let Some(record) = self.store.get_hierarchy(qid).await? else {
            return Ok(None);
        };
        if record.updated_at < self.ruleset.loaded_at() {
            // Predates the active ruleset: recompute
            return Ok(None);
        }
        let node = CachedNode {
            category: record.category,
            parents: record.parents,
        };
        self.cache.insert(qid.to_string(), node.clone());
        Ok(Some(node))
    }

    async fn remember(
        &self,
        qid: &str,
        category: &str,
        parents: &[String],
        name: &str,
    ) -> Result<(), ClassifyError> {
        self.store
            .save_classification(qid, category, parents, name)
            .await?;
        self.cache.insert(
            qid.to_string(),
            CachedNode {
                category: category.to_string(),
                parents: parents.to_vec(),
            },
        );
        Ok(())
    }
}
