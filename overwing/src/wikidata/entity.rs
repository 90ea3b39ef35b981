//! Wikidata entity API: lazy label hydration and name search.
//!
//! Labels are fetched in batches through `wbgetentities` and cached in the
//! store's KV cache, so repeated hydrations of neighboring tiles stay off the
//! network. Search goes through `wbsearchentities` and is uncached (it only
//! runs for validator fallbacks).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::provider::{BoxFuture, Client, ClientError};
use crate::store::Store;

use super::sparql::urlencode;

/// Entity API endpoint.
pub const ENTITY_ENDPOINT: &str = "https://www.wikidata.org/w/api.php";

/// Provider key for backoff tracking.
pub const ENTITY_PROVIDER: &str = "wikidata-api";

/// Default per-call timeout for entity API requests.
pub const ENTITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum ids per `wbgetentities` request.
const BATCH_SIZE: usize = 50;

/// KV-cache key prefix for labels.
const LABEL_CACHE_PREFIX: &str = "label:";

/// Label and search access used by the validator and rich hydration.
///
/// A trait seam so tests can drive the validator with canned entities.
pub trait LabelSource: Send + Sync {
    /// English labels for the given QIDs. Unknown ids are absent.
    fn fetch_labels<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        qids: &'a [String],
    ) -> BoxFuture<'a, Result<HashMap<String, String>, ClientError>>;

    /// Top search hit for a name, as (qid, label).
    fn search<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<(String, String)>, ClientError>>;
}

#[derive(Debug, Deserialize)]
struct EntityLabel {
    value: String,
}

#[derive(Debug, Deserialize)]
struct DataValue {
    #[serde(default)]
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Snak {
    #[serde(default)]
    datavalue: Option<DataValue>,
}

#[derive(Debug, Deserialize)]
struct Claim {
    mainsnak: Snak,
}

#[derive(Debug, Deserialize)]
struct Entity {
    #[serde(default)]
    labels: HashMap<String, EntityLabel>,
    #[serde(default)]
    claims: HashMap<String, Vec<Claim>>,
}

impl Entity {
    fn claim_ids(&self, property: &str) -> Vec<String> {
        self.claims
            .get(property)
            .map(|claims| {
                claims
                    .iter()
                    .filter_map(|c| c.mainsnak.datavalue.as_ref())
                    .filter_map(|dv| dv.value.get("id"))
                    .filter_map(|id| id.as_str())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// An entity's classification-relevant shape: English name plus the QIDs of
/// its subclass-of (P279) and instance-of (P31) targets.
#[derive(Debug, Clone, Default)]
pub struct EntityNode {
    pub name: String,
    pub parents: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GetEntitiesResponse {
    #[serde(default)]
    entities: HashMap<String, Entity>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    #[serde(default)]
    label: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Vec<SearchHit>,
}

/// Entity API client with label cache read-through.
pub struct EntityApi {
    client: Arc<Client>,
    store: Store,
}

impl EntityApi {
    pub fn new(client: Arc<Client>, store: Store) -> Self {
        Self { client, store }
    }

    async fn fetch_labels_inner(
        &self,
        cancel: &CancellationToken,
        qids: &[String],
    ) -> Result<HashMap<String, String>, ClientError> {
        let mut labels = HashMap::with_capacity(qids.len());
        let mut missing = Vec::new();

        for qid in qids {
            match self.store.cache_get(&format!("{LABEL_CACHE_PREFIX}{qid}")).await {
                Some(bytes) => {
                    if let Ok(label) = String::from_utf8(bytes) {
                        labels.insert(qid.clone(), label);
                    }
                }
                None => missing.push(qid.clone()),
            }
        }

        for chunk in missing.chunks(BATCH_SIZE) {
            let url = format!(
                "{ENTITY_ENDPOINT}?action=wbgetentities&ids={}&props=labels&languages=en&format=json",
                urlencode(&chunk.join("|"))
            );
            let body = self
                .client
                .get(cancel, ENTITY_PROVIDER, &url, &[], ENTITY_TIMEOUT)
                .await?;

            let response: GetEntitiesResponse = match serde_json::from_slice(&body) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed wbgetentities response, skipping batch");
                    continue;
                }
            };

            for (qid, entity) in response.entities {
                if let Some(label) = entity.labels.get("en") {
                    if let Err(e) = self
                        .store
                        .cache_set(&format!("{LABEL_CACHE_PREFIX}{qid}"), label.value.as_bytes())
                        .await
                    {
                        tracing::warn!(qid, error = %e, "Failed to cache label");
                    }
                    labels.insert(qid, label.value.clone());
                }
            }
        }

        Ok(labels)
    }

    /// Fetch classification nodes (label + P279/P31 targets) for a batch.
    ///
    /// Unlike labels these are not KV-cached here: the classifier persists
    /// every visited node to the hierarchy table itself.
    pub async fn fetch_nodes(
        &self,
        cancel: &CancellationToken,
        qids: &[String],
    ) -> Result<HashMap<String, EntityNode>, ClientError> {
        let mut nodes = HashMap::with_capacity(qids.len());
        for chunk in qids.chunks(BATCH_SIZE) {
            let url = format!(
                "{ENTITY_ENDPOINT}?action=wbgetentities&ids={}&props=labels%7Cclaims&languages=en&format=json",
                urlencode(&chunk.join("|"))
            );
            let body = self
                .client
                .get(cancel, ENTITY_PROVIDER, &url, &[], ENTITY_TIMEOUT)
                .await?;

            let response: GetEntitiesResponse = match serde_json::from_slice(&body) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed wbgetentities claims response, skipping batch");
                    continue;
                }
            };

            for (qid, entity) in response.entities {
                let mut parents = entity.claim_ids("P279");
                parents.extend(entity.claim_ids("P31"));
                let name = entity
                    .labels
                    .get("en")
                    .map(|l| l.value.clone())
                    .unwrap_or_default();
                nodes.insert(qid, EntityNode { name, parents });
            }
        }
        Ok(nodes)
    }

    async fn search_inner(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<Option<(String, String)>, ClientError> {
        let url = format!(
            "{ENTITY_ENDPOINT}?action=wbsearchentities&search={}&language=en&format=json",
            urlencode(name)
        );
        let body = self
            .client
            .get(cancel, ENTITY_PROVIDER, &url, &[], ENTITY_TIMEOUT)
            .await?;

        let response: SearchResponse = match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed wbsearchentities response");
                return Ok(None);
            }
        };

        Ok(response
            .search
            .into_iter()
            .next()
            .map(|hit| (hit.id, hit.label)))
    }
}

impl LabelSource for EntityApi {
    fn fetch_labels<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        qids: &'a [String],
    ) -> BoxFuture<'a, Result<HashMap<String, String>, ClientError>> {
        Box::pin(self.fetch_labels_inner(cancel, qids))
    }

    fn search<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Option<(String, String)>, ClientError>> {
        Box::pin(self.search_inner(cancel, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{HttpResponse, MockTransport, ProviderBackoff};
    use std::sync::atomic::AtomicUsize;

    async fn api_with(body: &str) -> EntityApi {
        let transport = MockTransport {
            response: Ok(HttpResponse {
                status: 200,
                retry_after: None,
                body: body.as_bytes().to_vec(),
            }),
            calls: AtomicUsize::new(0),
        };
        let client = Arc::new(Client::new(
            Arc::new(transport),
            Arc::new(ProviderBackoff::default()),
        ));
        let store = Store::in_memory().await.unwrap();
        EntityApi::new(client, store)
    }

    #[tokio::test]
    async fn test_fetch_labels_parses_entities() {
        let api = api_with(
            r#"{"entities": {
                "Q4917": {"labels": {"en": {"language": "en", "value": "Freiburg Minster"}}},
                "Q64": {"labels": {}}
            }}"#,
        )
        .await;
        let cancel = CancellationToken::new();
        let labels = api
            .fetch_labels(&cancel, &["Q4917".to_string(), "Q64".to_string()])
            .await
            .unwrap();
        assert_eq!(labels["Q4917"], "Freiburg Minster");
        assert!(!labels.contains_key("Q64"));
    }

    #[tokio::test]
    async fn test_fetch_labels_cached_second_time() {
        let transport = MockTransport {
            response: Ok(HttpResponse {
                status: 200,
                retry_after: None,
                body: br#"{"entities": {"Q1": {"labels": {"en": {"value": "universe"}}}}}"#.to_vec(),
            }),
            calls: AtomicUsize::new(0),
        };
        let transport = Arc::new(transport);
        let client = Arc::new(Client::new(
            Arc::clone(&transport) as Arc<dyn crate::provider::HttpTransport>,
            Arc::new(ProviderBackoff::default()),
        ));
        let store = Store::in_memory().await.unwrap();
        let api = EntityApi::new(client, store);
        let cancel = CancellationToken::new();

        let qids = vec!["Q1".to_string()];
        let first = api.fetch_labels(&cancel, &qids).await.unwrap();
        assert_eq!(first["Q1"], "universe");
        assert_eq!(transport.call_count(), 1);

        let second = api.fetch_labels(&cancel, &qids).await.unwrap();
        assert_eq!(second["Q1"], "universe");
        // Served from the KV cache: no second network call
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_search_takes_top_hit() {
        let api = api_with(
            r#"{"search": [
                {"id": "Q2", "label": "Rhine"},
                {"id": "Q3", "label": "Rhine (disambiguation)"}
            ]}"#,
        )
        .await;
        let cancel = CancellationToken::new();
        let hit = api.search(&cancel, "Rhine").await.unwrap().unwrap();
        assert_eq!(hit, ("Q2".to_string(), "Rhine".to_string()));
    }

    #[tokio::test]
    async fn test_search_empty() {
        let api = api_with(r#"{"search": []}"#).await;
        let cancel = CancellationToken::new();
        assert!(api.search(&cancel, "zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_search_is_none() {
        let api = api_with("not json").await;
        let cancel = CancellationToken::new();
        assert!(api.search(&cancel, "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_nodes_parses_claims() {
        let api = api_with(
            r#"{"entities": {"Q16970": {
                "labels": {"en": {"language": "en", "value": "church building"}},
                "claims": {
                    "P279": [
                        {"mainsnak": {"datavalue": {"value": {"id": "Q811979", "entity-type": "item"}}}},
                        {"mainsnak": {"datavalue": {"value": {"id": "Q1370598"}}}}
                    ],
                    "P31": [
                        {"mainsnak": {"datavalue": {"value": {"id": "Q28640"}}}}
                    ]
                }
            }}}"#,
        )
        .await;
        let cancel = CancellationToken::new();
        let nodes = api
            .fetch_nodes(&cancel, &["Q16970".to_string()])
            .await
            .unwrap();
        let node = &nodes["Q16970"];
        assert_eq!(node.name, "church building");
        // P279 targets first, then P31
        assert_eq!(node.parents, vec!["Q811979", "Q1370598", "Q28640"]);
    }

    #[tokio::test]
    async fn test_fetch_nodes_tolerates_missing_claims() {
        let api = api_with(r#"{"entities": {"Q1": {"labels": {}}}}"#).await;
        let cancel = CancellationToken::new();
        let nodes = api.fetch_nodes(&cancel, &["Q1".to_string()]).await.unwrap();
        assert!(nodes["Q1"].parents.is_empty());
        assert!(nodes["Q1"].name.is_empty());
    }
}
