//! Matching against collections the user selected for this turn.
//!
//! Collections are evaluated strictly in selection order, one query at a
//! time. The first collection whose best hit falls below its threshold is an
//! immediate match and no later collection is queried.

use anyhow::{Context, Result};

use crate::gateway::{query_sorted, GatewayRegistry};
use crate::models::{
    Candidate, CollectionMetadata, Detection, DetectionSource, DetectionSpec, SelectedCollection,
    StageOutcome, Strategy,
};
use crate::thresholds::{min_distance, Thresholds, Verdict, CANDIDATE_TOP_K};

/// Evaluate `selected` collections in order against `query`.
///
/// `base` supplies the name and response of the strategy returned for a
/// collection match (see [`StrategyConfig::dynamic_base`](crate::models::StrategyConfig::dynamic_base)).
///
/// Gateway errors abort the stage and propagate to the caller.
pub async fn match_dynamic_collections(
    gateways: &GatewayRegistry,
    base: &Strategy,
    selected: &[SelectedCollection],
    query: &str,
) -> Result<StageOutcome> {
    let mut candidates = Vec::new();

    for selection in selected {
        let gateway = gateways.get(&selection.knowledge_base)?;

        let info = gateway
            .collection_info(&selection.collection)
            .await
            .with_context(|| format!("Failed to fetch collection info for {}", selection))?;
        let thresholds =
            Thresholds::resolve(info.metadata.threshold, info.metadata.fallback_threshold);

        let hits = query_sorted(gateway, query, &selection.collection, CANDIDATE_TOP_K)
            .await
            .with_context(|| format!("Failed to query collection {}", selection))?;

        let Some(best) = min_distance(&hits) else {
            tracing::debug!(collection = %selection, "no hits; skipping collection");
            continue;
        };

        let strategy = merge_collection_strategy(base, selection, &info.metadata, thresholds);

        match thresholds.verdict(best) {
            Verdict::Immediate => {
                tracing::info!(
                    collection = %selection,
                    distance = best,
                    threshold = thresholds.threshold,
                    "immediate match on selected collection"
                );
                return Ok(StageOutcome::Matched(Detection::from_hits(
                    strategy,
                    hits,
                    DetectionSource::DynamicCollection,
                )));
            }
            Verdict::Candidate => {
                tracing::debug!(
                    collection = %selection,
                    distance = best,
                    fallback_threshold = thresholds.fallback_threshold,
                    "selected collection is a candidate"
                );
                candidates.push(Candidate {
                    strategy,
                    distance: best,
                    results: hits,
                    description: info
                        .metadata
                        .description
                        .clone()
                        .unwrap_or_else(|| selection.collection.clone()),
                });
            }
            Verdict::Reject => {
                tracing::debug!(
                    collection = %selection,
                    distance = best,
                    "selected collection rejected"
                );
            }
        }
    }

    Ok(StageOutcome::Candidates(candidates))
}

/// Build the strategy for a selected collection: `base` with the
/// collection's thresholds and, when set, its `system_prompt`.
pub fn merge_collection_strategy(
    base: &Strategy,
    selection: &SelectedCollection,
    metadata: &CollectionMetadata,
    thresholds: Thresholds,
) -> Strategy {
    let mut response = base.response.clone();
    if let Some(prompt) = &metadata.system_prompt {
        response.system_prompt = Some(prompt.clone());
    }

    Strategy {
        name: base.name.clone(),
        detection: DetectionSpec::Rag {
            knowledge_base: selection.knowledge_base.clone(),
            collection: Some(selection.collection.clone()),
            threshold: Some(thresholds.threshold),
            fallback_threshold: Some(thresholds.fallback_threshold),
            description: metadata.description.clone(),
        },
        response,
    }
}
