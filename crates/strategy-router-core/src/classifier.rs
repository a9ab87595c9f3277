//! LLM intent classification.
//!
//! When retrieval produced no immediate match, a language model picks one
//! strategy name from a menu built from:
//!
//! 1. each retrieval [`Candidate`] (its description),
//! 2. each `llm` strategy (its description), except the one named
//!    `DYNAMIC_RAG`, which only supplies the response for selected-collection
//!    matches and is reachable through its candidates,
//! 3. the `default` strategy, as "for anything else".
//!
//! The prompt ends with `Answer with only one word:` followed by the
//! distinct strategy names in menu order. The model's answer is trimmed and
//! resolved case-sensitively into an [`Intent`].
//!
//! Classification is advisory: model errors and unrecognized answers yield
//! `None` and the orchestrator falls back to the default strategy.

use std::cmp::Ordering;

use crate::chat::{ChatMessage, ChatModel, ChatOptions};
use crate::models::{
    Candidate, Detection, DetectionSource, DetectionSpec, Strategy, DYNAMIC_RAG_STRATEGY,
};

const DEFAULT_INTENT_DESCRIPTION: &str = "for anything else";

/// `llm` strategies the model may pick without retrieved context.
fn is_direct_intent(strategy: &Strategy) -> bool {
    strategy.is_llm() && strategy.name != DYNAMIC_RAG_STRATEGY
}

/// Options for the classification call.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierOptions {
    /// Model override; `None` lets the chat model use its own.
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 10,
            temperature: 0.0,
        }
    }
}

impl ClassifierOptions {
    fn chat_options(&self) -> ChatOptions {
        ChatOptions {
            model: self.model.clone(),
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        }
    }
}

/// One line of the classifier menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry<'a> {
    pub name: &'a str,
    pub description: &'a str,
}

/// The intents offered to the model, in prompt order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentMenu<'a> {
    entries: Vec<MenuEntry<'a>>,
}

impl<'a> IntentMenu<'a> {
    /// Build the menu: candidates first, then `llm` strategies, then the
    /// default. Identical (name, description) lines appear once.
    pub fn build(strategies: &'a [Strategy], candidates: &'a [Candidate]) -> Self {
        let mut entries: Vec<MenuEntry<'a>> = Vec::new();
        let mut push = |entry: MenuEntry<'a>| {
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        };

        for candidate in candidates {
            push(MenuEntry {
                name: &candidate.strategy.name,
                description: &candidate.description,
            });
        }
        for strategy in strategies.iter().filter(|s| is_direct_intent(s)) {
            if let DetectionSpec::Llm { description } = &strategy.detection {
                push(MenuEntry {
                    name: &strategy.name,
                    description,
                });
            }
        }
        if let Some(default) = strategies.iter().find(|s| s.is_default()) {
            push(MenuEntry {
                name: &default.name,
                description: DEFAULT_INTENT_DESCRIPTION,
            });
        }

        Self { entries }
    }

    pub fn entries(&self) -> &[MenuEntry<'a>] {
        &self.entries
    }

    /// Distinct strategy names in first-appearance order.
    pub fn names(&self) -> Vec<&'a str> {
        let mut names: Vec<&'a str> = Vec::new();
        for entry in &self.entries {
            if !names.contains(&entry.name) {
                names.push(entry.name);
            }
        }
        names
    }

    /// Render the single system prompt sent to the model.
    pub fn render_prompt(&self, query: &str, history: &[ChatMessage]) -> String {
        let mut prompt = String::from(
            "You are an intent classifier. Decide which category the user's latest message belongs to.\n\nCategories:\n",
        );
        for entry in &self.entries {
            prompt.push_str(&format!("- {}: {}\n", entry.name, entry.description));
        }

        if !history.is_empty() {
            prompt.push_str("\nConversation so far:\n");
            for message in history {
                prompt.push_str(&format!("{}: {}\n", message.role.as_str(), message.content));
            }
        }

        prompt.push_str(&format!("\nUser message: {}\n\n", query));
        prompt.push_str("Answer with only one word: ");
        prompt.push_str(&self.names().join(", "));
        prompt
    }
}

/// What the model's answer refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent<'a> {
    /// One or more retrieval candidates share the answered name.
    Retrieved(Vec<&'a Candidate>),
    /// A pure `llm` strategy.
    Direct(&'a Strategy),
    /// The default strategy.
    Fallback(&'a Strategy),
    /// Nothing known by that name.
    Unrecognized(String),
}

/// Resolve a raw model answer against the candidates and strategies.
pub fn resolve_intent<'a>(
    answer: &str,
    strategies: &'a [Strategy],
    candidates: &'a [Candidate],
) -> Intent<'a> {
    let name = answer.trim();

    let matching: Vec<&'a Candidate> = candidates
        .iter()
        .filter(|c| c.strategy.name == name)
        .collect();
    if !matching.is_empty() {
        return Intent::Retrieved(matching);
    }

    match strategies.iter().find(|s| s.name == name) {
        Some(s) if is_direct_intent(s) => Intent::Direct(s),
        Some(s) if s.is_default() => Intent::Fallback(s),
        _ => Intent::Unrecognized(name.to_string()),
    }
}

/// Combine same-named candidates, closest first.
///
/// The closest candidate supplies the strategy (and so its response
/// config); context and raw hits are concatenated in distance order.
/// Returns `None` for an empty slice.
pub fn merge_candidates(candidates: &[&Candidate]) -> Option<Detection> {
    let mut sorted: Vec<&Candidate> = candidates.to_vec();
    sorted.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));

    let closest = sorted.first()?;
    let mut context = Vec::new();
    let mut rag_results = Vec::new();
    for candidate in &sorted {
        context.extend(candidate.results.iter().map(|h| h.text.clone()));
        rag_results.extend(candidate.results.iter().cloned());
    }

    Some(Detection {
        strategy: closest.strategy.clone(),
        context,
        rag_results,
        source: DetectionSource::Classifier,
    })
}

/// Ask `chat` to pick a strategy for `query`.
///
/// Returns `None` without calling the model when there are no candidates
/// and no `llm` strategies to pick directly. Also returns `None` if the call fails or the
/// answer names nothing on the menu.
pub async fn classify_intent(
    chat: &dyn ChatModel,
    options: &ClassifierOptions,
    strategies: &[Strategy],
    query: &str,
    history: &[ChatMessage],
    candidates: &[Candidate],
) -> Option<Detection> {
    if candidates.is_empty() && !strategies.iter().any(is_direct_intent) {
        tracing::debug!("nothing to classify between; skipping intent classifier");
        return None;
    }

    let menu = IntentMenu::build(strategies, candidates);
    let messages = [ChatMessage::system(menu.render_prompt(query, history))];

    let completion = match chat.generate_chat(&messages, &options.chat_options()).await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(model = chat.name(), error = %e, "intent classification failed");
            return None;
        }
    };

    match resolve_intent(&completion.content, strategies, candidates) {
        Intent::Retrieved(matching) => {
            tracing::info!(
                strategy = %matching[0].strategy.name,
                candidates = matching.len(),
                "classifier chose retrieval candidates"
            );
            merge_candidates(&matching)
        }
        Intent::Direct(strategy) | Intent::Fallback(strategy) => {
            tracing::info!(strategy = %strategy.name, "classifier chose strategy");
            Some(Detection::bare(strategy.clone(), DetectionSource::Classifier))
        }
        Intent::Unrecognized(answer) => {
            tracing::warn!(answer = %answer, "classifier answer matches no strategy");
            None
        }
    }
}
