//! Retrieval abstraction for Strategy Router.
//!
//! The [`RetrievalGateway`] trait is the boundary to a knowledge base: one
//! gateway per knowledge base, each serving one or more collections. The
//! matchers reach gateways only through a [`GatewayRegistry`] passed in by
//! the caller, so the pipeline never depends on ambient provider state.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{CollectionInfo, RagHit};
use crate::thresholds::sort_hits;

/// A nearest-neighbor query against one collection.
#[derive(Debug, Clone, Copy)]
pub struct QueryRequest<'a> {
    pub text: &'a str,
    pub collection: &'a str,
    pub top_k: usize,
}

/// Health as reported by a knowledge base backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collections_count: Option<u64>,
}

impl GatewayHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Abstract retrieval backend for one knowledge base.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`collection_info`](RetrievalGateway::collection_info) | Metadata for a collection (thresholds, description, prompt) |
/// | [`query`](RetrievalGateway::query) | Top-k nearest hits for a text |
/// | [`list_collections`](RetrievalGateway::list_collections) | All collections with metadata |
/// | [`health`](RetrievalGateway::health) | Backend health |
#[async_trait]
pub trait RetrievalGateway: Send + Sync {
    async fn collection_info(&self, collection: &str) -> Result<CollectionInfo>;

    /// Nearest hits for `req.text`. Providers are expected to return hits
    /// ascending by distance, but callers should not rely on it; see
    /// [`query_sorted`].
    async fn query(&self, req: &QueryRequest<'_>) -> Result<Vec<RagHit>>;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    async fn health(&self) -> Result<GatewayHealth>;
}

/// Query a gateway and sort the hits ascending by distance.
pub async fn query_sorted(
    gateway: &dyn RetrievalGateway,
    text: &str,
    collection: &str,
    top_k: usize,
) -> Result<Vec<RagHit>> {
    let mut hits = gateway
        .query(&QueryRequest {
            text,
            collection,
            top_k,
        })
        .await?;
    sort_hits(&mut hits);
    Ok(hits)
}

/// Knowledge-base name → gateway lookup.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use strategy_router_core::gateway::GatewayRegistry;
/// use strategy_router_core::gateway::memory::InMemoryGateway;
///
/// let mut gateways = GatewayRegistry::new();
/// gateways.register("docs", Arc::new(InMemoryGateway::new()));
/// assert!(gateways.get("docs").is_ok());
/// assert!(gateways.get("missing").is_err());
/// ```
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<String, Arc<dyn RetrievalGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gateway, replacing any previous one for the same name.
    pub fn register(&mut self, knowledge_base: impl Into<String>, gateway: Arc<dyn RetrievalGateway>) {
        self.gateways.insert(knowledge_base.into(), gateway);
    }

    pub fn get(&self, knowledge_base: &str) -> Result<&dyn RetrievalGateway> {
        self.gateways
            .get(knowledge_base)
            .map(|g| g.as_ref())
            .ok_or_else(|| anyhow!("no retrieval gateway registered for knowledge base '{}'", knowledge_base))
    }

    /// Registered knowledge-base names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.gateways.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }
}

impl std::fmt::Debug for GatewayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayRegistry")
            .field("knowledge_bases", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryGateway;
    use super::*;
    use crate::models::CollectionMetadata;

    #[tokio::test]
    async fn test_query_sorted_reorders_unsorted_provider_output() {
        let gateway = InMemoryGateway::new().with_unsorted_collection(
            "docs",
            CollectionMetadata::default(),
            vec![RagHit::new("far", 0.9), RagHit::new("near", 0.1), RagHit::new("mid", 0.5)],
        );
        let hits = query_sorted(&gateway, "q", "docs", 3).await.unwrap();
        let order: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(order, vec!["near", "mid", "far"]);
    }

    #[test]
    fn test_registry_names_sorted() {
        let mut registry = GatewayRegistry::new();
        registry.register("zeta", Arc::new(InMemoryGateway::new()));
        registry.register("alpha", Arc::new(InMemoryGateway::new()));
        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
        assert_eq!(registry.len(), 2);
        let err = registry.get("beta").err().unwrap().to_string();
        assert!(err.contains("beta"));
    }
}
