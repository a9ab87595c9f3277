//! Matching against administrator-configured RAG strategies.
//!
//! Same threshold logic as [`crate::dynamic`], applied to `rag` strategies in
//! configuration order. Strategies whose knowledge base was already touched
//! by the user's selected collections are skipped without a query.

use std::collections::HashSet;

use anyhow::{Context, Result};

use crate::gateway::{query_sorted, GatewayRegistry};
use crate::models::{Candidate, Detection, DetectionSource, DetectionSpec, StageOutcome, Strategy};
use crate::thresholds::{min_distance, Thresholds, Verdict, CANDIDATE_TOP_K};

/// Evaluate configured `rag` strategies against `query`.
///
/// Non-`rag` strategies are ignored. Gateway errors abort the stage and
/// propagate to the caller.
pub async fn match_static_rag(
    gateways: &GatewayRegistry,
    strategies: &[Strategy],
    query: &str,
    checked_knowledge_bases: &HashSet<String>,
) -> Result<StageOutcome> {
    let mut candidates = Vec::new();

    for strategy in strategies {
        let DetectionSpec::Rag {
            knowledge_base,
            collection,
            threshold,
            fallback_threshold,
            description,
        } = &strategy.detection
        else {
            continue;
        };

        if checked_knowledge_bases.contains(knowledge_base) {
            tracing::debug!(
                strategy = %strategy.name,
                knowledge_base = %knowledge_base,
                "knowledge base already queried via selected collections; skipping"
            );
            continue;
        }

        let gateway = gateways.get(knowledge_base)?;
        let collection = collection.as_deref().unwrap_or(knowledge_base);
        let thresholds = Thresholds::resolve(*threshold, *fallback_threshold);

        let hits = query_sorted(gateway, query, collection, CANDIDATE_TOP_K)
            .await
            .with_context(|| {
                format!(
                    "Failed to query {}:{} for strategy '{}'",
                    knowledge_base, collection, strategy.name
                )
            })?;

        let Some(best) = min_distance(&hits) else {
            tracing::debug!(strategy = %strategy.name, "no hits; skipping strategy");
            continue;
        };

        match thresholds.verdict(best) {
            Verdict::Immediate => {
                tracing::info!(
                    strategy = %strategy.name,
                    distance = best,
                    threshold = thresholds.threshold,
                    "immediate match on configured strategy"
                );
                return Ok(StageOutcome::Matched(Detection::from_hits(
                    strategy.clone(),
                    hits,
                    DetectionSource::StaticRag,
                )));
            }
            Verdict::Candidate => {
                tracing::debug!(strategy = %strategy.name, distance = best, "configured strategy is a candidate");
                candidates.push(Candidate {
                    strategy: strategy.clone(),
                    distance: best,
                    results: hits,
                    description: description.clone().unwrap_or_else(|| strategy.name.clone()),
                });
            }
            Verdict::Reject => {
                tracing::debug!(strategy = %strategy.name, distance = best, "configured strategy rejected");
            }
        }
    }

    Ok(StageOutcome::Candidates(candidates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::InMemoryGateway;
    use crate::models::{CollectionMetadata, RagHit, ResponseSpec};
    use std::sync::Arc;

    fn rag(name: &str, kb: &str, description: Option<&str>) -> Strategy {
        Strategy {
            name: name.to_string(),
            detection: DetectionSpec::Rag {
                knowledge_base: kb.to_string(),
                collection: None,
                threshold: None,
                fallback_threshold: None,
                description: description.map(str::to_string),
            },
            response: ResponseSpec::default(),
        }
    }

    fn gateway(collection: &str, distance: f64) -> Arc<InMemoryGateway> {
        Arc::new(InMemoryGateway::new().with_collection(
            collection,
            CollectionMetadata::default(),
            vec![RagHit::new(format!("{} text", collection), distance)],
        ))
    }

    #[tokio::test]
    async fn test_skips_checked_knowledge_bases() {
        let hr = gateway("hr", 0.1);
        let it = gateway("it", 0.4);
        let mut gateways = GatewayRegistry::new();
        gateways.register("hr", hr.clone());
        gateways.register("it", it.clone());

        let strategies = vec![rag("HR", "hr", None), rag("IT", "it", Some("IT support"))];
        let checked: HashSet<String> = ["hr".to_string()].into_iter().collect();

        let outcome = match_static_rag(&gateways, &strategies, "q", &checked)
            .await
            .unwrap();

        assert_eq!(hr.query_count(), 0);
        assert_eq!(it.query_count(), 1);
        let StageOutcome::Candidates(candidates) = outcome else {
            panic!("expected candidates");
        };
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].strategy.name, "IT");
        assert_eq!(candidates[0].description, "IT support");
    }

    #[tokio::test]
    async fn test_first_immediate_match_short_circuits() {
        let first = gateway("first", 0.05);
        let second = gateway("second", 0.01);
        let mut gateways = GatewayRegistry::new();
        gateways.register("first", first.clone());
        gateways.register("second", second.clone());

        let strategies = vec![rag("FIRST", "first", None), rag("SECOND", "second", None)];
        let outcome = match_static_rag(&gateways, &strategies, "q", &HashSet::new())
            .await
            .unwrap();

        let StageOutcome::Matched(detection) = outcome else {
            panic!("expected match");
        };
        assert_eq!(detection.strategy.name, "FIRST");
        assert_eq!(detection.source, DetectionSource::StaticRag);
        assert_eq!(detection.context, vec!["first text".to_string()]);
        assert_eq!(second.query_count(), 0);
    }

    #[tokio::test]
    async fn test_non_rag_strategies_ignored() {
        let strategies = vec![
            Strategy {
                name: "GREETING".to_string(),
                detection: DetectionSpec::Llm {
                    description: "greetings".to_string(),
                },
                response: ResponseSpec::default(),
            },
            Strategy {
                name: "DEFAULT".to_string(),
                detection: DetectionSpec::Default,
                response: ResponseSpec::default(),
            },
        ];
        let outcome = match_static_rag(&GatewayRegistry::new(), &strategies, "q", &HashSet::new())
            .await
            .unwrap();
        assert_eq!(outcome, StageOutcome::Candidates(vec![]));
    }

    #[tokio::test]
    async fn test_explicit_collection_and_description_default() {
        let gw = gateway("policies", 0.45);
        let mut gateways = GatewayRegistry::new();
        gateways.register("hr", gw.clone());

        let mut strategy = rag("HR_POLICY", "hr", None);
        if let DetectionSpec::Rag { collection, .. } = &mut strategy.detection {
            *collection = Some("policies".to_string());
        }

        let outcome = match_static_rag(&gateways, &[strategy], "q", &HashSet::new())
            .await
            .unwrap();
        assert_eq!(gw.queried_collections(), vec!["policies".to_string()]);
        let StageOutcome::Candidates(candidates) = outcome else {
            panic!("expected candidates");
        };
        assert_eq!(candidates[0].description, "HR_POLICY");
    }
}
