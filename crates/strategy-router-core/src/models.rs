//! Core data models used throughout Strategy Router.
//!
//! All of these are request-scoped: built from the configuration snapshot
//! and the user's selected collections at the start of a chat turn, consumed
//! by the detection pipeline, and dropped once a response handler is chosen.

use anyhow::{bail, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Name given to strategies synthesized from user-selected collections.
pub const DYNAMIC_RAG_STRATEGY: &str = "DYNAMIC_RAG";

/// A named response configuration selected by the detection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    pub detection: DetectionSpec,
    #[serde(default)]
    pub response: ResponseSpec,
}

impl Strategy {
    pub fn is_default(&self) -> bool {
        matches!(self.detection, DetectionSpec::Default)
    }

    pub fn is_llm(&self) -> bool {
        matches!(self.detection, DetectionSpec::Llm { .. })
    }

    pub fn is_rag(&self) -> bool {
        matches!(self.detection, DetectionSpec::Rag { .. })
    }
}

/// How a strategy is detected.
///
/// Serialized with an internal `type` tag so configuration files read
/// naturally:
///
/// ```toml
/// [strategies.detection]
/// type = "rag"
/// knowledge_base = "docs"
/// threshold = 0.2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DetectionSpec {
    /// Matched by nearest-neighbor distance against a knowledge base.
    Rag {
        knowledge_base: String,
        /// Collection to query. Defaults to the knowledge base name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collection: Option<String>,
        /// Immediate-match bound (exclusive).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threshold: Option<f64>,
        /// Candidate bound (inclusive).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback_threshold: Option<f64>,
        /// Intent line shown to the classifier when this strategy becomes a candidate.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Matched only by the LLM intent classifier, using `description`.
    Llm {
        #[serde(default)]
        description: String,
    },
    /// Last-resort strategy.
    Default,
}

/// Response configuration for a strategy.
///
/// Either an LLM configuration or a `static_response` reply. Dynamic
/// collection matches override `system_prompt` with collection metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_response: Option<String>,
}

impl ResponseSpec {
    pub fn is_static(&self) -> bool {
        self.static_response.is_some()
    }
}

/// A collection the user explicitly selected for this turn.
///
/// Order within a selection list is the query order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectedCollection {
    #[serde(alias = "knowledgeBase")]
    pub knowledge_base: String,
    pub collection: String,
}

impl SelectedCollection {
    pub fn new(knowledge_base: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            knowledge_base: knowledge_base.into(),
            collection: collection.into(),
        }
    }
}

impl FromStr for SelectedCollection {
    type Err = anyhow::Error;

    /// Parse `knowledge_base:collection`.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((kb, coll)) if !kb.trim().is_empty() && !coll.trim().is_empty() => {
                Ok(Self::new(kb.trim(), coll.trim()))
            }
            _ => bail!(
                "invalid collection '{}': expected <knowledge_base>:<collection>",
                s
            ),
        }
    }
}

impl fmt::Display for SelectedCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.knowledge_base, self.collection)
    }
}

/// A single nearest-neighbor result. Lower distance means more relevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagHit {
    pub text: String,
    pub distance: f64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl RagHit {
    pub fn new(text: impl Into<String>, distance: f64) -> Self {
        Self {
            text: text.into(),
            distance,
            metadata: serde_json::Map::new(),
        }
    }
}

/// Collection details as reported by a retrieval gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default)]
    pub metadata: CollectionMetadata,
}

/// Routing-relevant collection metadata.
///
/// Collection metadata is free-form on the retrieval side, so thresholds are
/// accepted as numbers or numeric strings. Keys this crate does not use are
/// kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub threshold: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub fallback_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(n)) => Ok(Some(n)),
        Some(NumberOrText::Text(s)) => {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse::<f64>()
                    .map(Some)
                    .map_err(|e| serde::de::Error::custom(format!("invalid number '{}': {}", s, e)))
            }
        }
    }
}

/// A non-terminal match whose best distance fell between `threshold` and
/// `fallback_threshold`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub strategy: Strategy,
    /// Minimum distance among `results`.
    pub distance: f64,
    pub results: Vec<RagHit>,
    pub description: String,
}

/// Which pipeline stage produced a [`Detection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// The configuration holds only a default strategy.
    SingleDefault,
    DynamicCollection,
    StaticRag,
    Classifier,
    /// Nothing matched; the configured default was used.
    Default,
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DetectionSource::SingleDefault => "single_default",
            DetectionSource::DynamicCollection => "dynamic_collection",
            DetectionSource::StaticRag => "static_rag",
            DetectionSource::Classifier => "classifier",
            DetectionSource::Default => "default",
        };
        f.write_str(label)
    }
}

/// Terminal output of the detection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub strategy: Strategy,
    /// Retrieved texts, closest first.
    pub context: Vec<String>,
    pub rag_results: Vec<RagHit>,
    pub source: DetectionSource,
}

impl Detection {
    /// A detection with no retrieval context.
    pub fn bare(strategy: Strategy, source: DetectionSource) -> Self {
        Self {
            strategy,
            context: Vec::new(),
            rag_results: Vec::new(),
            source,
        }
    }

    /// A detection whose context is the texts of `hits`, in order.
    pub fn from_hits(strategy: Strategy, hits: Vec<RagHit>, source: DetectionSource) -> Self {
        Self {
            strategy,
            context: hits.iter().map(|h| h.text.clone()).collect(),
            rag_results: hits,
            source,
        }
    }
}

/// Result of a retrieval stage: either a terminal match or the candidates
/// accumulated for the next stage (possibly none).
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Matched(Detection),
    Candidates(Vec<Candidate>),
}

/// The strategy list for one request cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default)]
    pub strategies: Vec<Strategy>,
}

impl StrategyConfig {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    pub fn get(&self, name: &str) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.name == name)
    }

    pub fn default_strategy(&self) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.is_default())
    }

    /// `true` when the configuration is a lone default strategy.
    pub fn is_default_only(&self) -> bool {
        self.strategies.len() == 1 && self.strategies[0].is_default()
    }

    /// Base strategy for matches against user-selected collections.
    ///
    /// Uses the response of a configured `DYNAMIC_RAG` strategy if present,
    /// else the default strategy's response, else an empty response. A
    /// configured `DYNAMIC_RAG` strategy is declared with `type = "llm"` and
    /// no description; the classifier never offers it on its own.
    pub fn dynamic_base(&self) -> Strategy {
        let response = self
            .get(DYNAMIC_RAG_STRATEGY)
            .or_else(|| self.default_strategy())
            .map(|s| s.response.clone())
            .unwrap_or_default();
        Strategy {
            name: DYNAMIC_RAG_STRATEGY.to_string(),
            detection: DetectionSpec::Rag {
                knowledge_base: String::new(),
                collection: None,
                threshold: None,
                fallback_threshold: None,
                description: None,
            },
            response,
        }
    }

    /// Check structural rules that must hold before detection runs.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let mut defaults = 0usize;

        for strategy in &self.strategies {
            if strategy.name.trim().is_empty() {
                bail!("strategy name must not be empty");
            }
            if !seen.insert(strategy.name.as_str()) {
                bail!("duplicate strategy name: '{}'", strategy.name);
            }

            match &strategy.detection {
                DetectionSpec::Default => defaults += 1,
                DetectionSpec::Llm { description } => {
                    if description.trim().is_empty() && strategy.name != DYNAMIC_RAG_STRATEGY {
                        bail!(
                            "strategy '{}': llm detection requires a description",
                            strategy.name
                        );
                    }
                }
                DetectionSpec::Rag {
                    knowledge_base,
                    threshold,
                    fallback_threshold,
                    ..
                } => {
                    if knowledge_base.trim().is_empty() {
                        bail!(
                            "strategy '{}': rag detection requires a knowledge_base",
                            strategy.name
                        );
                    }
                    for (field, value) in [
                        ("threshold", threshold),
                        ("fallback_threshold", fallback_threshold),
                    ] {
                        if let Some(v) = value {
                            if !v.is_finite() || !(0.0..=2.0).contains(v) {
                                bail!(
                                    "strategy '{}': {} must be in [0.0, 2.0], got {}",
                                    strategy.name,
                                    field,
                                    v
                                );
                            }
                        }
                    }
                    if let (Some(t), Some(f)) = (threshold, fallback_threshold) {
                        if t > f {
                            bail!(
                                "strategy '{}': threshold ({}) must not exceed fallback_threshold ({})",
                                strategy.name,
                                t,
                                f
                            );
                        }
                    }
                }
            }
        }

        match defaults {
            0 => bail!("configuration must contain exactly one strategy of type 'default'"),
            1 => Ok(()),
            n => bail!("at most one default strategy is allowed, found {}", n),
        }
    }
}
