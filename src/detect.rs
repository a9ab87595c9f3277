//! Strategy detection for one chat turn.
//!
//! Wires the configured knowledge bases and classifier into a
//! [`StrategyOrchestrator`] and prints the chosen strategy. Each detection
//! runs inside a `detection` tracing span carrying a random `detection_id`
//! so the stage decisions logged by the pipeline can be correlated.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::Instrument;
use uuid::Uuid;

use strategy_router_core::chat::{ChatMessage, ChatModel};
use strategy_router_core::gateway::GatewayRegistry;
use strategy_router_core::models::{Detection, SelectedCollection, StrategyConfig};
use strategy_router_core::StrategyOrchestrator;

use crate::config::Config;
use crate::gateway_http::build_registry;
use crate::llm::create_chat_model;

/// Run detection with explicit collaborators.
pub async fn detect_for_query(
    strategies: &StrategyConfig,
    gateways: &GatewayRegistry,
    chat: Option<&dyn ChatModel>,
    config: &Config,
    selected: &[SelectedCollection],
    query: &str,
    history: &[ChatMessage],
) -> Result<Detection> {
    let detection_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "detection",
        %detection_id,
        selected = selected.len(),
        history = history.len()
    );

    async {
        let mut orchestrator = StrategyOrchestrator::new(strategies, gateways)
            .with_classifier_options(config.classifier.options());
        if let Some(chat) = chat {
            orchestrator = orchestrator.with_chat_model(chat);
        }

        let detection = orchestrator.detect_strategy(selected, query, history).await?;
        tracing::info!(
            strategy = %detection.strategy.name,
            source = %detection.source,
            context = detection.context.len(),
            "strategy detected"
        );
        Ok::<_, anyhow::Error>(detection)
    }
    .instrument(span)
    .await
}

/// Read a conversation history file: a JSON array of `{ role, content }`.
pub fn load_history(path: &Path) -> Result<Vec<ChatMessage>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse history file: {}", path.display()))
}

/// CLI entry point for `router detect`.
pub async fn run_detect(
    config: &Config,
    query: &str,
    collections: &[String],
    history_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let selected = collections
        .iter()
        .map(|c| c.parse::<SelectedCollection>())
        .collect::<Result<Vec<_>>>()?;
    let history = match history_path {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };

    let strategies = config.strategy_config();
    let gateways = build_registry(config)?;
    let chat = create_chat_model(&config.classifier)?;

    let detection = detect_for_query(
        &strategies,
        &gateways,
        chat.as_deref(),
        config,
        &selected,
        query,
        &history,
    )
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detection)?);
        return Ok(());
    }

    print_detection(&detection);
    Ok(())
}

fn print_detection(detection: &Detection) {
    let response = &detection.strategy.response;

    println!("strategy: {}", detection.strategy.name);
    println!("source:   {}", detection.source);
    if let Some(model) = &response.model {
        println!(
            "model:    {}{}",
            response
                .provider
                .as_deref()
                .map(|p| format!("{}/", p))
                .unwrap_or_default(),
            model
        );
    }
    if let Some(prompt) = &response.system_prompt {
        println!("prompt:   {}", first_line(prompt));
    }
    if let Some(reply) = &response.static_response {
        println!("static:   {}", first_line(reply));
    }

    if detection.rag_results.is_empty() {
        println!("context:  none");
        return;
    }

    println!("context:  {} passages", detection.rag_results.len());
    for (i, hit) in detection.rag_results.iter().enumerate() {
        println!();
        println!("{}. [distance: {:.4}]", i + 1, hit.distance);
        println!("    {}", first_line(&hit.text));
    }
}

fn first_line(text: &str) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    if line.chars().count() > 100 {
        let truncated: String = line.chars().take(100).collect();
        format!("{}...", truncated)
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_line_truncates() {
        assert_eq!(first_line("short\nsecond"), "short");
        let long = "x".repeat(150);
        assert_eq!(first_line(&long).len(), 103);
        assert_eq!(first_line(""), "");
    }

    #[test]
    fn test_load_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(
            &path,
            r#"[{ "role": "user", "content": "hi" }, { "role": "assistant", "content": "hello" }]"#,
        )
        .unwrap();
        let history = load_history(&path).unwrap();
        assert_eq!(history, vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")]);
    }
}
