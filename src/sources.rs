use anyhow::Result;

use strategy_router_core::gateway::RetrievalGateway;
use strategy_router_core::models::{DetectionSpec, Strategy};

use crate::config::Config;
use crate::gateway_http::HttpGateway;

/// Print the health of every configured knowledge base.
pub async fn list_sources(config: &Config) -> Result<()> {
    if config.knowledge_bases.is_empty() {
        println!("No knowledge bases configured.");
        return Ok(());
    }

    println!(
        "{:<20} {:<12} {:<12} URL",
        "KNOWLEDGE BASE", "STATUS", "COLLECTIONS"
    );
    for (name, kb) in &config.knowledge_bases {
        let gateway = HttpGateway::new(name, kb)?;
        let (status, count) = match gateway.health().await {
            Ok(health) => (
                health.status.clone(),
                health
                    .collections_count
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Err(e) => {
                tracing::debug!(knowledge_base = %name, error = %e, "health check failed");
                ("unreachable".to_string(), "-".to_string())
            }
        };
        println!("{:<20} {:<12} {:<12} {}", name, status, count, kb.url);
    }

    Ok(())
}

/// Print the collections of one knowledge base with their routing metadata.
pub async fn list_collections(config: &Config, knowledge_base: &str) -> Result<()> {
    let kb = config.knowledge_bases.get(knowledge_base).ok_or_else(|| {
        anyhow::anyhow!("Unknown knowledge base: '{}'", knowledge_base)
    })?;
    let gateway = HttpGateway::new(knowledge_base, kb)?;
    let collections = gateway.list_collections().await?;

    if collections.is_empty() {
        println!("No collections.");
        return Ok(());
    }

    println!(
        "{:<28} {:<8} {:<10} {:<10} DESCRIPTION",
        "COLLECTION", "COUNT", "THRESHOLD", "FALLBACK"
    );
    for info in &collections {
        let meta = &info.metadata;
        println!(
            "{:<28} {:<8} {:<10} {:<10} {}",
            info.name,
            display_opt(info.count),
            display_opt(meta.threshold),
            display_opt(meta.fallback_threshold),
            meta.description.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

/// Print configured strategies in evaluation order.
pub fn list_strategies(config: &Config) -> Result<()> {
    if config.strategies.is_empty() {
        println!("No strategies configured.");
        return Ok(());
    }

    println!("{:<20} {:<8} {:<10} DETAIL", "STRATEGY", "TYPE", "RESPONSE");
    for strategy in &config.strategies {
        println!(
            "{:<20} {:<8} {:<10} {}",
            strategy.name,
            detection_type(strategy),
            if strategy.response.is_static() { "static" } else { "llm" },
            detection_detail(strategy)
        );
    }

    Ok(())
}

fn detection_type(strategy: &Strategy) -> &'static str {
    match strategy.detection {
        DetectionSpec::Rag { .. } => "rag",
        DetectionSpec::Llm { .. } => "llm",
        DetectionSpec::Default => "default",
    }
}

fn detection_detail(strategy: &Strategy) -> String {
    match &strategy.detection {
        DetectionSpec::Rag {
            knowledge_base,
            collection,
            threshold,
            fallback_threshold,
            ..
        } => format!(
            "{}:{} threshold={} fallback={}",
            knowledge_base,
            collection.as_deref().unwrap_or(knowledge_base),
            display_opt(*threshold),
            display_opt(*fallback_threshold)
        ),
        DetectionSpec::Llm { description } => description.clone(),
        DetectionSpec::Default => "-".to_string(),
    }
}

fn display_opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
