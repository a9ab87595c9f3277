//! HTTP retrieval gateway for the collection-wrapper service.
//!
//! Each configured knowledge base is a small HTTP service in front of a
//! vector database. [`HttpGateway`] implements
//! [`RetrievalGateway`] against its API:
//!
//! | Method | Endpoint | Response |
//! |--------|----------|----------|
//! | `collection_info` | `GET /collections/{name}` | `{ name, count, metadata }` |
//! | `query` | `POST /query` | `{ results: [{ text, distance, metadata }], collection_metadata }` |
//! | `list_collections` | `GET /collections` | `{ collections: [...] }` |
//! | `health` | `GET /health` | `{ status, collections_count }` or `[{ status, error }, code]` |
//!
//! Collection names are sent as single percent-encoded path segments.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry with exponential backoff (1s, 2s, 4s, ... capped at 32s)
//! - Other HTTP 4xx → fail immediately
//! - Network errors and timeouts → retry

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use strategy_router_core::gateway::{GatewayHealth, GatewayRegistry, QueryRequest, RetrievalGateway};
use strategy_router_core::models::{CollectionInfo, CollectionMetadata, RagHit};

use crate::config::{Config, KnowledgeBaseConfig};

/// Gateway for one knowledge base served over HTTP.
pub struct HttpGateway {
    name: String,
    base_url: Url,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(name: &str, config: &KnowledgeBaseConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .with_context(|| format!("Failed to build HTTP client for knowledge base '{}'", name))?;

        let base_url = Url::parse(&config.url).with_context(|| {
            format!("Invalid URL '{}' for knowledge base '{}'", config.url, name)
        })?;
        if base_url.cannot_be_a_base() {
            bail!("Invalid URL '{}' for knowledge base '{}'", config.url, name);
        }

        Ok(Self {
            name: name.to_string(),
            base_url,
            max_retries: config.max_retries,
            client,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// URL for `segments` under the base path, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Knowledge base '{}' URL cannot be a base", self.name))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request, retrying transient failures, and decode the JSON body.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::warn!(
                    knowledge_base = %self.name,
                    url = %url,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "retrying knowledge base request"
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.request(method.clone(), url.clone());
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<T>().await.with_context(|| {
                            format!("Invalid response from knowledge base '{}' ({})", self.name, url)
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!(
                            "Knowledge base '{}' error {}: {}",
                            self.name,
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("Knowledge base '{}' error {}: {}", self.name, status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::Error::new(e).context(format!(
                        "Request to knowledge base '{}' failed ({})",
                        self.name, url
                    )));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Knowledge base request failed after retries")))
    }
}

// ============ Wire types ============

#[derive(Debug, Deserialize)]
struct WireCollection {
    name: String,
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    metadata: Option<CollectionMetadata>,
}

impl From<WireCollection> for CollectionInfo {
    fn from(wire: WireCollection) -> Self {
        CollectionInfo {
            name: wire.name,
            count: wire.count,
            metadata: wire.metadata.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireCollectionList {
    #[serde(default)]
    collections: Vec<WireCollection>,
}

#[derive(Debug, Deserialize)]
struct WireQueryResponse {
    #[serde(default)]
    results: Vec<WireHit>,
}

#[derive(Debug, Deserialize)]
struct WireHit {
    text: String,
    distance: f64,
    #[serde(default)]
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// `/health` body. An unhealthy service answers with a `[body, status]` pair.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireHealth {
    Report(GatewayHealth),
    WithStatus(GatewayHealth, u16),
}

impl From<WireHealth> for GatewayHealth {
    fn from(wire: WireHealth) -> Self {
        match wire {
            WireHealth::Report(health) | WireHealth::WithStatus(health, _) => health,
        }
    }
}

#[async_trait]
impl RetrievalGateway for HttpGateway {
    async fn collection_info(&self, collection: &str) -> Result<CollectionInfo> {
        let wire: WireCollection = self
            .call(Method::GET, self.endpoint(&["collections", collection])?, None)
            .await?;
        Ok(wire.into())
    }

    async fn query(&self, req: &QueryRequest<'_>) -> Result<Vec<RagHit>> {
        let body = serde_json::json!({
            "query": req.text,
            "top_k": req.top_k,
            "collection": req.collection,
        });
        let wire: WireQueryResponse = self
            .call(Method::POST, self.endpoint(&["query"])?, Some(&body))
            .await?;

        tracing::debug!(
            knowledge_base = %self.name,
            collection = req.collection,
            hits = wire.results.len(),
            "knowledge base query complete"
        );

        Ok(wire
            .results
            .into_iter()
            .map(|h| RagHit {
                text: h.text,
                distance: h.distance,
                metadata: h.metadata.unwrap_or_default(),
            })
            .collect())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let wire: WireCollectionList = self
            .call(Method::GET, self.endpoint(&["collections"])?, None)
            .await?;
        Ok(wire.collections.into_iter().map(Into::into).collect())
    }

    async fn health(&self) -> Result<GatewayHealth> {
        let wire: WireHealth = self
            .call(Method::GET, self.endpoint(&["health"])?, None)
            .await?;
        Ok(wire.into())
    }
}

/// Build one [`HttpGateway`] per configured knowledge base.
pub fn build_registry(config: &Config) -> Result<GatewayRegistry> {
    let mut gateways = GatewayRegistry::new();
    for (name, kb) in &config.knowledge_bases {
        gateways.register(name.clone(), Arc::new(HttpGateway::new(name, kb)?));
    }
    Ok(gateways)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(url: &str) -> Result<HttpGateway> {
        HttpGateway::new(
            "docs",
            &KnowledgeBaseConfig {
                url: url.to_string(),
                timeout_secs: 5,
                max_retries: 0,
            },
        )
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let gw = gateway("http://localhost:5006/").unwrap();
        assert_eq!(gw.endpoint(&["health"]).unwrap().as_str(), "http://localhost:5006/health");
        assert_eq!(gw.name(), "docs");

        let gw = gateway("http://localhost:5006/rag/").unwrap();
        assert_eq!(
            gw.endpoint(&["collections"]).unwrap().as_str(),
            "http://localhost:5006/rag/collections"
        );
    }

    #[test]
    fn test_collection_name_is_one_encoded_segment() {
        let gw = gateway("http://localhost:5006").unwrap();
        let url = gw.endpoint(&["collections", "team a/b?x#y"]).unwrap();
        assert_eq!(url.path(), "/collections/team%20a%2Fb%3Fx%23y");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let err = gateway("localhost:5006").err().unwrap();
        assert!(format!("{:#}", err).contains("Invalid URL"), "{:#}", err);
        assert!(gateway("not a url").is_err());
    }

    #[test]
    fn test_wire_health_object_and_status_pair() {
        let ok: GatewayHealth = serde_json::from_str::<WireHealth>(
            r#"{ "status": "healthy", "collections_count": 3 }"#,
        )
        .unwrap()
        .into();
        assert!(ok.is_healthy());
        assert_eq!(ok.collections_count, Some(3));

        let down: GatewayHealth = serde_json::from_str::<WireHealth>(
            r#"[{ "status": "unhealthy", "error": "connection refused" }, 503]"#,
        )
        .unwrap()
        .into();
        assert_eq!(down.status, "unhealthy");
        assert!(!down.is_healthy());
    }

    #[test]
    fn test_wire_collection_null_metadata() {
        let wire: WireCollection =
            serde_json::from_str(r#"{ "name": "docs", "count": 4, "metadata": null }"#).unwrap();
        let info: CollectionInfo = wire.into();
        assert_eq!(info.count, Some(4));
        assert_eq!(info.metadata, CollectionMetadata::default());
    }

    #[test]
    fn test_wire_query_ignores_extra_fields() {
        let wire: WireQueryResponse = serde_json::from_str(
            r#"{ "results": [], "message": "No relevant data found." }"#,
        )
        .unwrap();
        assert!(wire.results.is_empty());
    }
}
