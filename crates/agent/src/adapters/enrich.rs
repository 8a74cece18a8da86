use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use concierge_core::{Condition, Offer};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::llm::{extract_json_object, CompletionRequest, LlmClient};
use crate::tools::{Enrichment, SpecEnricher, ToolError};

const SPEC_SYSTEM_PROMPT: &str = "You are a product data normalization expert. \
Extract key specifications from the provided product text strings. \
Return a JSON object with a 'results' list, where each item has: \
'id' (int), 'brand' (str), 'model' (str, normalized), 'storage' (str, e.g. '256GB' or null), \
and 'condition' (str, normalized to 'New', 'Used', 'Refurbished', or 'Unknown'). \
Handle Arabic text and varied formats.";

/// Batch spec extraction with a single LLM call. Items are addressed by
/// their index so the model may answer out of order or skip some.
pub struct LlmSpecEnricher {
    llm: Arc<dyn LlmClient>,
}

impl LlmSpecEnricher {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    async fn try_enrich(&self, items: &[Offer]) -> Result<Vec<Enrichment>, ToolError> {
        let prompt_items = items
            .iter()
            .enumerate()
            .map(|(id, offer)| {
                let condition = offer.condition.map(Condition::as_str).unwrap_or("");
                let text = format!("{} {} {}", offer.name, offer.retailer, condition);
                json!({ "id": id, "text": text.trim() })
            })
            .collect::<Vec<_>>();

        let user = serde_json::to_string(&prompt_items)
            .map_err(|error| ToolError::Decode(error.to_string()))?;
        let raw = self
            .llm
            .complete(&CompletionRequest::json(SPEC_SYSTEM_PROMPT, user))
            .await
            .map_err(|error| ToolError::Llm(error.to_string()))?;

        let parsed: SpecResponse = serde_json::from_str(extract_json_object(&raw))
            .map_err(|error| ToolError::Decode(error.to_string()))?;
        let mut by_id = parsed
            .results
            .into_iter()
            .map(|result| (result.id, result))
            .collect::<HashMap<_, _>>();

        Ok((0..items.len())
            .map(|id| match by_id.remove(&id) {
                Some(result) => Enrichment {
                    brand: result.brand,
                    model: result.model,
                    storage: result.storage,
                    condition: Some(
                        result
                            .condition
                            .as_deref()
                            .and_then(Condition::parse)
                            .unwrap_or(Condition::Unknown),
                    ),
                },
                None => degraded(),
            })
            .collect())
    }
}

#[derive(Deserialize)]
struct SpecResponse {
    #[serde(default)]
    results: Vec<SpecResult>,
}

#[derive(Deserialize)]
struct SpecResult {
    id: usize,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    storage: Option<String>,
    #[serde(default)]
    condition: Option<String>,
}

fn degraded() -> Enrichment {
    Enrichment { condition: Some(Condition::Unknown), ..Enrichment::default() }
}

#[async_trait]
impl SpecEnricher for LlmSpecEnricher {
    async fn enrich_batch(&self, items: &[Offer]) -> Vec<Enrichment> {
        if items.is_empty() {
            return Vec::new();
        }

        match self.try_enrich(items).await {
            Ok(enrichments) => enrichments,
            Err(error) => {
                warn!(
                    event_name = "agent.tool.enrich.degraded",
                    items = items.len(),
                    error = %error,
                    "spec enrichment failed, degrading batch"
                );
                items.iter().map(|_| degraded()).collect()
            }
        }
    }
}
