//! TOML configuration for the `router` binary.
//!
//! ```toml
//! strategies_path = "strategies.json"   # optional, merged after inline strategies
//!
//! [[strategies]]
//! name = "DEFAULT"
//! detection = { type = "default" }
//! response = { provider = "openai", model = "gpt-4o-mini" }
//!
//! [knowledge_bases.docs]
//! url = "http://localhost:5006"
//!
//! [classifier]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use strategy_router_core::classifier::ClassifierOptions;
use strategy_router_core::models::{DetectionSpec, Strategy, StrategyConfig};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub strategies: Vec<Strategy>,
    /// JSON file holding `{ "strategies": [...] }`, relative to the config file.
    #[serde(default)]
    pub strategies_path: Option<PathBuf>,
    #[serde(default)]
    pub knowledge_bases: BTreeMap<String, KnowledgeBaseConfig>,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeBaseConfig {
    pub url: String,
    #[serde(default = "default_kb_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_kb_max_retries")]
    pub max_retries: u32,
}

fn default_kb_timeout_secs() -> u64 {
    30
}
fn default_kb_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override (OpenAI-compatible servers, remote Ollama).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_classifier_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: None,
            timeout_secs: 20,
            max_tokens: 10,
            temperature: 0.0,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_classifier_timeout_secs() -> u64 {
    20
}
fn default_max_tokens() -> u32 {
    10
}

impl ClassifierConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn options(&self) -> ClassifierOptions {
        ClassifierOptions {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_format() -> String {
    "text".to_string()
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format == "json"
    }
}

#[derive(Debug, Deserialize)]
struct StrategyFile {
    #[serde(default)]
    strategies: Vec<Strategy>,
}

impl Config {
    /// The strategy list handed to the detection pipeline.
    pub fn strategy_config(&self) -> StrategyConfig {
        StrategyConfig::new(self.strategies.clone())
    }
}

/// Read, merge, and validate the configuration at `path`.
///
/// Strategies from `strategies_path` are appended after the inline
/// `[[strategies]]` entries.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if let Some(strategies_path) = &config.strategies_path {
        let resolved = match path.parent() {
            Some(dir) if strategies_path.is_relative() => dir.join(strategies_path),
            _ => strategies_path.clone(),
        };
        let raw = std::fs::read_to_string(&resolved).with_context(|| {
            format!("Failed to read strategies file: {}", resolved.display())
        })?;
        let file: StrategyFile = serde_json::from_str(&raw).with_context(|| {
            format!("Failed to parse strategies file: {}", resolved.display())
        })?;
        config.strategies.extend(file.strategies);
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    config
        .strategy_config()
        .validate()
        .with_context(|| "Invalid strategy configuration")?;

    for strategy in &config.strategies {
        if let DetectionSpec::Rag { knowledge_base, .. } = &strategy.detection {
            if !config.knowledge_bases.contains_key(knowledge_base) {
                bail!(
                    "strategy '{}' refers to unknown knowledge base '{}'",
                    strategy.name,
                    knowledge_base
                );
            }
        }
    }

    for (name, kb) in &config.knowledge_bases {
        if kb.url.trim().is_empty() {
            bail!("knowledge_bases.{}.url must not be empty", name);
        }
        if kb.timeout_secs == 0 {
            bail!("knowledge_bases.{}.timeout_secs must be > 0", name);
        }
    }

    match config.classifier.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown classifier provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if config.classifier.is_enabled() {
        if config.classifier.model.is_none() {
            bail!(
                "classifier.model must be specified when provider is '{}'",
                config.classifier.provider
            );
        }
        if config.classifier.max_tokens == 0 {
            bail!("classifier.max_tokens must be > 0");
        }
        if !(0.0..=2.0).contains(&config.classifier.temperature) {
            bail!("classifier.temperature must be in [0.0, 2.0]");
        }
    }

    match config.logging.format.as_str() {
        "text" | "json" => {}
        other => bail!("Unknown logging format: '{}'. Must be text or json.", other),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.strategies.is_empty());
        assert!(!config.classifier.is_enabled());
        assert_eq!(config.classifier.timeout_secs, 20);
        assert_eq!(config.classifier.options(), ClassifierOptions::default());
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.is_json());
    }

    #[test]
    fn test_knowledge_base_defaults() {
        let config: Config = toml::from_str(
            r#"
            [knowledge_bases.docs]
            url = "http://localhost:5006"
            "#,
        )
        .unwrap();
        let kb = &config.knowledge_bases["docs"];
        assert_eq!(kb.timeout_secs, 30);
        assert_eq!(kb.max_retries, 2);
    }
}
