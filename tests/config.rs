use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use strategy_router::config::load_config;
use strategy_router_core::models::DetectionSpec;
use tempfile::TempDir;

const BASE: &str = r#"
[[strategies]]
name = "GREETING"
response = { static_response = "Hi!" }
detection = { type = "llm", description = "greetings" }

[[strategies]]
name = "DEFAULT"
response = { provider = "openai", model = "gpt-4o-mini" }
detection = { type = "default" }

[knowledge_bases.docs]
url = "http://localhost:5006"
"#;

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("router.toml");
    fs::write(&path, content).unwrap();
    path
}

fn load_err(content: &str) -> String {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, content);
    format!("{:#}", load_config(&path).unwrap_err())
}

fn run_router(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_router"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .expect("failed to run router binary");
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn test_load_minimal_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, BASE);
    let config = load_config(&path).unwrap();

    assert_eq!(config.strategies.len(), 2);
    assert_eq!(config.knowledge_bases["docs"].timeout_secs, 30);
    assert!(!config.classifier.is_enabled());
    assert!(config.strategy_config().default_strategy().is_some());
}

#[test]
fn test_strategies_file_appended_after_inline() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("strategies.json"),
        r#"{ "strategies": [
            { "name": "DOCS",
              "detection": { "type": "rag", "knowledge_base": "docs", "threshold": "0.3" },
              "response": { "model": "gpt-4o" } }
        ] }"#,
    )
    .unwrap();
    let content = format!("strategies_path = \"strategies.json\"\n{}", BASE);
    let path = write_config(&dir, &content);

    // numeric strings are only lenient in collection metadata
    let err = format!("{:#}", load_config(&path).unwrap_err());
    assert!(err.contains("strategies.json"), "{}", err);

    fs::write(
        dir.path().join("strategies.json"),
        r#"{ "strategies": [
            { "name": "DOCS",
              "detection": { "type": "rag", "knowledge_base": "docs", "threshold": 0.3 },
              "response": { "model": "gpt-4o" } }
        ] }"#,
    )
    .unwrap();
    let config = load_config(&path).unwrap();
    let names: Vec<&str> = config.strategies.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["GREETING", "DEFAULT", "DOCS"]);
    assert!(matches!(
        config.strategies[2].detection,
        DetectionSpec::Rag { threshold: Some(t), .. } if (t - 0.3).abs() < 1e-9
    ));
}

#[test]
fn test_example_config_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/router.example.toml");
    let config = load_config(&path).unwrap();
    let strategies = config.strategy_config();

    let dynamic = strategies.get("DYNAMIC_RAG").unwrap();
    assert!(matches!(&dynamic.detection, DetectionSpec::Llm { description } if description.is_empty()));
    assert_eq!(
        strategies.dynamic_base().response.system_prompt.as_deref(),
        Some("Answer from the provided documents.")
    );
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = format!("{:#}", load_config(&dir.path().join("nope.toml")).unwrap_err());
    assert!(err.contains("Failed to read config file"), "{}", err);
}

#[test]
fn test_rejects_two_defaults() {
    let content = format!(
        "{}\n[[strategies]]\nname = \"OTHER\"\ndetection = {{ type = \"default\" }}\n",
        BASE
    );
    let err = load_err(&content);
    assert!(err.contains("at most one default"), "{}", err);
}

#[test]
fn test_rejects_missing_default() {
    let err = load_err(
        r#"
[[strategies]]
name = "GREETING"
detection = { type = "llm", description = "greetings" }
"#,
    );
    assert!(err.contains("exactly one strategy of type 'default'"), "{}", err);
}

#[test]
fn test_rejects_unknown_knowledge_base() {
    let content = format!(
        "{}\n[[strategies]]\nname = \"HR\"\ndetection = {{ type = \"rag\", knowledge_base = \"hr\" }}\n",
        BASE
    );
    let err = load_err(&content);
    assert!(err.contains("unknown knowledge base 'hr'"), "{}", err);
}

#[test]
fn test_rejects_unknown_classifier_provider() {
    let content = format!("{}\n[classifier]\nprovider = \"bard\"\nmodel = \"x\"\n", BASE);
    let err = load_err(&content);
    assert!(err.contains("Unknown classifier provider"), "{}", err);
}

#[test]
fn test_enabled_classifier_requires_model() {
    let content = format!("{}\n[classifier]\nprovider = \"ollama\"\n", BASE);
    let err = load_err(&content);
    assert!(err.contains("classifier.model must be specified"), "{}", err);
}

#[test]
fn test_rejects_unknown_logging_format() {
    let content = format!("{}\n[logging]\nformat = \"xml\"\n", BASE);
    let err = load_err(&content);
    assert!(err.contains("Unknown logging format"), "{}", err);
}

#[test]
fn test_cli_check_and_strategies() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, BASE);

    let (stdout, stderr, success) = run_router(&path, &["check"]);
    assert!(success, "check failed: {}", stderr);
    assert!(stdout.contains("Configuration OK: 2 strategies, 1 knowledge bases"));

    let (stdout, stderr, success) = run_router(&path, &["strategies"]);
    assert!(success, "strategies failed: {}", stderr);
    assert!(stdout.contains("GREETING"));
    assert!(stdout.contains("static"));
    assert!(stdout.contains("default"));
}

#[test]
fn test_cli_single_default_detect_without_network() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[[strategies]]
name = "DEFAULT"
response = { model = "gpt-4o-mini" }
detection = { type = "default" }
"#,
    );

    let (stdout, stderr, success) = run_router(&path, &["detect", "hello", "--json"]);
    assert!(success, "detect failed: {}", stderr);
    let detection: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(detection["strategy"]["name"], "DEFAULT");
    assert_eq!(detection["source"], "single_default");
    assert_eq!(detection["context"], serde_json::json!([]));
}

#[test]
fn test_cli_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[[strategies]]\nname = \"X\"\ndetection = { type = \"bogus\" }\n");
    let (_, stderr, success) = run_router(&path, &["check"]);
    assert!(!success);
    assert!(stderr.contains("Failed to parse config file"), "{}", stderr);
}
