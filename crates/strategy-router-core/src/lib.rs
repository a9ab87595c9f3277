//! # Strategy Router Core
//!
//! Runtime-agnostic strategy detection: given the strategies configured for
//! a chat turn, the collections the user selected, and the query, pick
//! exactly one response strategy plus any retrieved context.
//!
//! This crate contains no tokio, HTTP, or filesystem I/O. Knowledge bases
//! and language models are reached only through the
//! [`RetrievalGateway`](gateway::RetrievalGateway) and
//! [`ChatModel`](chat::ChatModel) traits, passed in by the caller.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Strategies, hits, candidates, detections, config validation |
//! | [`thresholds`] | Immediate / candidate / reject distance bounds |
//! | [`gateway`] | Retrieval trait, registry, in-memory gateway |
//! | [`chat`] | Chat model trait and scripted model |
//! | [`dynamic`] | Matching user-selected collections |
//! | [`static_rag`] | Matching configured `rag` strategies |
//! | [`classifier`] | LLM intent classification over candidates |
//! | [`orchestrator`] | Stage sequencing and default fallback |

pub mod chat;
pub mod classifier;
pub mod dynamic;
pub mod gateway;
pub mod models;
pub mod orchestrator;
pub mod static_rag;
pub mod thresholds;

pub use models::{Candidate, Detection, DetectionSource, SelectedCollection, Strategy, StrategyConfig};
pub use orchestrator::StrategyOrchestrator;
