//! Strategy detection orchestrator.
//!
//! Runs the detection stages in order and stops at the first terminal
//! result:
//!
//! ```text
//! single default? ──yes──▶ default
//!       │ no
//!       ▼
//! selected collections ──immediate──▶ DYNAMIC_RAG + context
//!       │ candidates, checked knowledge bases
//!       ▼
//! configured rag strategies (minus checked) ──immediate──▶ strategy + context
//!       │ candidates (dynamic first, then static)
//!       ▼
//! LLM intent classifier ──some──▶ strategy (+ merged context)
//!       │ none
//!       ▼
//! default
//! ```

use std::collections::HashSet;

use anyhow::{anyhow, Result};

use crate::chat::{ChatMessage, ChatModel};
use crate::classifier::{classify_intent, ClassifierOptions};
use crate::dynamic::match_dynamic_collections;
use crate::gateway::GatewayRegistry;
use crate::models::{Detection, DetectionSource, SelectedCollection, StageOutcome, StrategyConfig};
use crate::static_rag::match_static_rag;

/// Detection pipeline over one configuration snapshot.
///
/// All collaborators are borrowed from the caller; the orchestrator holds
/// no state between calls.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use strategy_router_core::gateway::GatewayRegistry;
/// use strategy_router_core::models::{DetectionSpec, ResponseSpec, Strategy, StrategyConfig};
/// use strategy_router_core::orchestrator::StrategyOrchestrator;
///
/// # tokio_test_block_on(async {
/// let config = StrategyConfig::new(vec![Strategy {
///     name: "DEFAULT".to_string(),
///     detection: DetectionSpec::Default,
///     response: ResponseSpec::default(),
/// }]);
/// let gateways = GatewayRegistry::new();
/// let detection = StrategyOrchestrator::new(&config, &gateways)
///     .detect_strategy(&[], "hello", &[])
///     .await
///     .unwrap();
/// assert_eq!(detection.strategy.name, "DEFAULT");
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub struct StrategyOrchestrator<'a> {
    config: &'a StrategyConfig,
    gateways: &'a GatewayRegistry,
    chat: Option<&'a dyn ChatModel>,
    classifier: ClassifierOptions,
}

impl<'a> StrategyOrchestrator<'a> {
    pub fn new(config: &'a StrategyConfig, gateways: &'a GatewayRegistry) -> Self {
        Self {
            config,
            gateways,
            chat: None,
            classifier: ClassifierOptions::default(),
        }
    }

    /// Enable the LLM intent classifier stage.
    pub fn with_chat_model(mut self, chat: &'a dyn ChatModel) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_classifier_options(mut self, options: ClassifierOptions) -> Self {
        self.classifier = options;
        self
    }

    /// Pick exactly one strategy for `query`.
    ///
    /// # Errors
    ///
    /// Retrieval failures (unknown knowledge base, gateway errors) abort
    /// detection and propagate. A configuration without a default strategy
    /// is an error once every stage has declined.
    pub async fn detect_strategy(
        &self,
        selected: &[SelectedCollection],
        query: &str,
        history: &[ChatMessage],
    ) -> Result<Detection> {
        let default = self.config.default_strategy();

        if selected.is_empty() && self.config.is_default_only() {
            if let Some(strategy) = default {
                tracing::debug!(strategy = %strategy.name, "only a default strategy is configured");
                return Ok(Detection::bare(strategy.clone(), DetectionSource::SingleDefault));
            }
        }

        let base = self.config.dynamic_base();
        let mut candidates =
            match match_dynamic_collections(self.gateways, &base, selected, query).await? {
                StageOutcome::Matched(detection) => return Ok(detection),
                StageOutcome::Candidates(c) => c,
            };

        let checked: HashSet<String> = selected.iter().map(|s| s.knowledge_base.clone()).collect();

        match match_static_rag(self.gateways, &self.config.strategies, query, &checked).await? {
            StageOutcome::Matched(detection) => return Ok(detection),
            StageOutcome::Candidates(c) => candidates.extend(c),
        }

        tracing::debug!(candidates = candidates.len(), "no immediate match");

        if let Some(chat) = self.chat {
            if let Some(detection) = classify_intent(
                chat,
                &self.classifier,
                &self.config.strategies,
                query,
                history,
                &candidates,
            )
            .await
            {
                return Ok(detection);
            }
        }

        let strategy = default.ok_or_else(|| anyhow!("no default strategy configured"))?;
        tracing::debug!(strategy = %strategy.name, "falling back to default strategy");
        Ok(Detection::bare(strategy.clone(), DetectionSource::Default))
    }
}
