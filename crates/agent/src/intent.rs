use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use concierge_core::Intent;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::llm::{extract_json_object, CompletionRequest, LlmClient};

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("shopping query must not be empty")]
    EmptyQuery,
    #[error("intent oracle failed: {0}")]
    Oracle(String),
    #[error("intent oracle returned malformed output: {0}")]
    Malformed(String),
}

/// Reads a raw request into an [`Intent`]. Implementations guarantee the
/// ready/follow-up pairing described on [`Intent`].
#[async_trait]
pub trait IntentResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Intent, IntentError>;
}

const INTENT_SYSTEM_PROMPT: &str = r#"You are a personal shopping concierge for shoppers in Saudi Arabia. Your job is to find the right product, not just any product.

Act like a personal shopper, not a search box:
- Ask a clarifying question when budget, a key preference (brand, size, features) or the use case is missing.
- Set ready=true only when the user gave a budget and at least one preference, or said they have no preference, or insists on seeing something now.

search_query (when ready=true) is a clean product search term such as "Samsung TV 55 inch 4K" or "iPhone 15 Pro Max 256GB". Never put conversational text in it.

Examples:
User: "I need TV" -> ready=false, follow_up_question: "What's your budget? And what size works for your room?"
User: "TV, budget 2000 SAR" -> ready=true, search_query: "TV 50 inch"
User: "just give me any TV" -> ready=true, search_query: "TV 43 inch budget"

Answer in the user's language (English or Arabic).

Respond with strict JSON with these keys: need_summary (string), category (string), search_query (string), budget_min (number|null), budget_max (number|null), must_have (string[]), nice_to_have (string[]), missing_info (string[]), follow_up_question (string|null), ready (boolean)."#;

pub struct LlmIntentResolver {
    llm: Arc<dyn LlmClient>,
}

impl LlmIntentResolver {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl IntentResolver for LlmIntentResolver {
    async fn resolve(&self, query: &str) -> Result<Intent, IntentError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(IntentError::EmptyQuery);
        }

        let request = CompletionRequest::json(
            INTENT_SYSTEM_PROMPT,
            format!(
                "User request: {query}\n\nExtract a clean product search_query (no conversational text). Respond with JSON."
            ),
        );
        let raw = self
            .llm
            .complete(&request)
            .await
            .map_err(|error| IntentError::Oracle(error.to_string()))?;

        parse_intent(&raw, query)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawIntent {
    #[serde(default)]
    need_summary: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    search_query: Option<String>,
    #[serde(default)]
    canonical_search_query: Option<String>,
    #[serde(default)]
    budget_min: Option<Value>,
    #[serde(default)]
    budget_max: Option<Value>,
    #[serde(default)]
    must_have: Option<Vec<String>>,
    #[serde(default)]
    nice_to_have: Option<Vec<String>>,
    #[serde(default)]
    missing_info: Option<Vec<String>>,
    #[serde(default)]
    missing_details: Option<Vec<String>>,
    #[serde(default)]
    follow_up_question: Option<String>,
    #[serde(default)]
    ready: Option<bool>,
    #[serde(default)]
    enough_information: Option<bool>,
}

/// Parses oracle output, accepting the older `enough_information` and
/// `missing_details` keys, then normalizes the ready/follow-up pairing.
pub fn parse_intent(raw: &str, query: &str) -> Result<Intent, IntentError> {
    let parsed: RawIntent = serde_json::from_str(extract_json_object(raw))
        .map_err(|error| IntentError::Malformed(error.to_string()))?;

    let canonical_search_query =
        parsed.canonical_search_query.or(parsed.search_query).unwrap_or_default();
    let intent = Intent {
        need_summary: parsed.need_summary.unwrap_or_default(),
        category: parsed.category.unwrap_or_default(),
        canonical_search_query,
        budget_min: parsed.budget_min.as_ref().and_then(number_from),
        budget_max: parsed.budget_max.as_ref().and_then(number_from),
        must_have: to_set(parsed.must_have),
        nice_to_have: to_set(parsed.nice_to_have),
        missing_info: to_set(parsed.missing_info.or(parsed.missing_details)),
        follow_up_question: parsed.follow_up_question,
        ready: parsed.ready.or(parsed.enough_information).unwrap_or(false),
    };

    Ok(intent.normalize(query))
}

fn to_set(values: Option<Vec<String>>) -> BTreeSet<String> {
    values
        .unwrap_or_default()
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn number_from(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|number| number.is_finite())
}
