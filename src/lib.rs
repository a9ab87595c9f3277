//! # Strategy Router
//!
//! Strategy detection for a RAG + LLM chat service. For each user turn the
//! router picks one response strategy (retrieval-augmented, intent-specific,
//! or default) and gathers the retrieved context that goes with it.
//!
//! The pipeline itself lives in `strategy-router-core`; this crate supplies
//! configuration, HTTP clients for knowledge bases and classifier models,
//! and the `router` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────────┐   ┌──────────────┐
//! │ router.toml  │──▶│ StrategyOrchestrator│──▶│  Detection   │
//! │ strategies   │   │ dynamic → static →  │   │ strategy +   │
//! └──────────────┘   │ classifier → default│   │ context      │
//!                    └───┬────────────┬───┘   └──────────────┘
//!                        ▼            ▼
//!                 ┌────────────┐ ┌──────────┐
//!                 │ HttpGateway│ │ OpenAI / │
//!                 │ (per KB)   │ │ Ollama   │
//!                 └────────────┘ └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`gateway_http`] | Knowledge-base HTTP client with retry |
//! | [`llm`] | Chat clients for intent classification |
//! | [`detect`] | Detection entry point and CLI output |
//! | [`sources`] | Knowledge-base, collection, and strategy listings |
//! | [`logging`] | `tracing` subscriber setup |

pub mod config;
pub mod detect;
pub mod gateway_http;
pub mod llm;
pub mod logging;
pub mod sources;
