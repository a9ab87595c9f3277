//! In-memory [`RetrievalGateway`] for testing and embedding.
//!
//! Collections hold canned hits instead of vectors; a query returns the
//! stored hits for the collection regardless of the query text. Every
//! `query` call is recorded so callers can assert which collections were
//! touched and in what order.

use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{CollectionInfo, CollectionMetadata, RagHit};
use crate::thresholds::sort_hits;

use super::{GatewayHealth, QueryRequest, RetrievalGateway};

struct StoredCollection {
    info: CollectionInfo,
    hits: Vec<RagHit>,
    /// Return hits in stored order instead of nearest-first.
    unsorted: bool,
    failure: Option<String>,
}

/// In-memory gateway for tests and embedded use.
pub struct InMemoryGateway {
    collections: Mutex<Vec<StoredCollection>>,
    queries: Mutex<Vec<String>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Add a collection whose queries return `hits`, nearest first.
    pub fn with_collection(
        self,
        name: &str,
        metadata: CollectionMetadata,
        hits: Vec<RagHit>,
    ) -> Self {
        self.insert(name, metadata, hits, false, None);
        self
    }

    /// Add a collection whose queries return `hits` in the given order,
    /// imitating a provider that does not sort its output.
    pub fn with_unsorted_collection(
        self,
        name: &str,
        metadata: CollectionMetadata,
        hits: Vec<RagHit>,
    ) -> Self {
        self.insert(name, metadata, hits, true, None);
        self
    }

    /// Add a collection whose queries fail with `message`.
    pub fn with_failing_collection(self, name: &str, message: &str) -> Self {
        self.insert(
            name,
            CollectionMetadata::default(),
            Vec::new(),
            false,
            Some(message.to_string()),
        );
        self
    }

    /// Collections queried so far, in call order.
    pub fn queried_collections(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }

    pub fn query_count(&self) -> usize {
        lock(&self.queries).len()
    }

    fn insert(
        &self,
        name: &str,
        metadata: CollectionMetadata,
        hits: Vec<RagHit>,
        unsorted: bool,
        failure: Option<String>,
    ) {
        let mut collections = lock(&self.collections);
        collections.retain(|c| c.info.name != name);
        collections.push(StoredCollection {
            info: CollectionInfo {
                name: name.to_string(),
                count: Some(hits.len() as u64),
                metadata,
            },
            hits,
            unsorted,
            failure,
        });
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RetrievalGateway for InMemoryGateway {
    async fn collection_info(&self, collection: &str) -> Result<CollectionInfo> {
        let collections = lock(&self.collections);
        match collections.iter().find(|c| c.info.name == collection) {
            Some(stored) => Ok(stored.info.clone()),
            None => bail!("Collection '{}' not found", collection),
        }
    }

    async fn query(&self, req: &QueryRequest<'_>) -> Result<Vec<RagHit>> {
        lock(&self.queries).push(req.collection.to_string());

        let collections = lock(&self.collections);
        let stored = match collections.iter().find(|c| c.info.name == req.collection) {
            Some(s) => s,
            None => bail!("Collection '{}' not found", req.collection),
        };
        if let Some(message) = &stored.failure {
            bail!("{}", message);
        }

        let mut hits = stored.hits.clone();
        if !stored.unsorted {
            sort_hits(&mut hits);
        }
        hits.truncate(req.top_k);
        Ok(hits)
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        Ok(lock(&self.collections)
            .iter()
            .map(|c| c.info.clone())
            .collect())
    }

    async fn health(&self) -> Result<GatewayHealth> {
        Ok(GatewayHealth {
            status: "healthy".to_string(),
            collections_count: Some(lock(&self.collections).len() as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_query_truncates_to_top_k_nearest() {
        let gateway = InMemoryGateway::new().with_collection(
            "docs",
            CollectionMetadata::default(),
            vec![
                RagHit::new("d", 0.9),
                RagHit::new("a", 0.1),
                RagHit::new("c", 0.6),
                RagHit::new("b", 0.3),
            ],
        );
        let hits = gateway
            .query(&QueryRequest {
                text: "anything",
                collection: "docs",
                top_k: 3,
            })
            .await
            .unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(gateway.queried_collections(), vec!["docs".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_collection_errors() {
        let gateway = InMemoryGateway::new();
        assert!(gateway.collection_info("nope").await.is_err());
        let res = gateway
            .query(&QueryRequest {
                text: "q",
                collection: "nope",
                top_k: 3,
            })
            .await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_failing_collection() {
        let gateway = InMemoryGateway::new().with_failing_collection("flaky", "connection reset");
        let err = gateway
            .query(&QueryRequest {
                text: "q",
                collection: "flaky",
                top_k: 3,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(gateway.query_count(), 1);
    }

    #[tokio::test]
    async fn test_list_and_health() {
        let gateway = InMemoryGateway::new()
            .with_collection("a", CollectionMetadata::default(), vec![])
            .with_collection("b", CollectionMetadata::default(), vec![RagHit::new("x", 0.2)]);
        let listed = gateway.list_collections().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].count, Some(1));
        let health = gateway.health().await.unwrap();
        assert!(health.is_healthy());
        assert_eq!(health.collections_count, Some(2));
    }
}
