use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use concierge_core::SelectedOffer;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm::{extract_json_object, CompletionRequest, LlmClient};
use crate::tools::{RankedSelection, RankingInput, RankingOracle, ToolError};

const RANKING_SYSTEM_PROMPT: &str = "You are a shopping concierge for Saudi Arabia. \
Pick the best product for this user from the candidates and explain why in the 'reason' field \
(one or two compelling sentences). Weigh price and value, trusted retailer, condition and how \
well the specs match the user's needs. Only choose links that appear in the candidate list. \
Answer in the user's language (English or Arabic). \
Respond with JSON: {\"items\": [{\"name\", \"price\", \"currency\", \"retailer\", \"link\", \"reason\"}], \"notes\": string|null}.";

const DEFAULT_REASON: &str = "Best match for your request";

/// LLM judgment over the pre-sorted pool. Selections are mapped back onto
/// the candidates by link; anything else the model returns is discarded.
pub struct LlmRankingOracle {
    llm: Arc<dyn LlmClient>,
}

impl LlmRankingOracle {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[derive(Deserialize)]
struct RankingResponse {
    #[serde(default)]
    items: Vec<RankedItem>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Deserialize)]
struct RankedItem {
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

fn user_prompt(input: &RankingInput) -> String {
    let slim = input
        .candidates
        .iter()
        .map(|candidate| {
            let offer = &candidate.offer;
            json!({
                "name": offer.name,
                "price": offer.effective_price(),
                "currency": offer.currency,
                "retailer": offer.retailer,
                "link": offer.link,
                "condition": offer.condition,
                "image": offer.image,
                "model": offer.model,
                "storage": offer.storage,
                "is_trusted": candidate.is_trusted,
            })
        })
        .collect::<Vec<Value>>();

    let intent = &input.intent;
    let policy = json!({
        "need_summary": intent.need_summary,
        "category": intent.category,
        "budget_min": intent.budget_min,
        "budget_max": intent.budget_max,
        "must_have": intent.must_have,
        "nice_to_have": intent.nice_to_have,
        "trusted_only": input.trusted_only,
    });

    format!(
        "User query: {}\n\nShopping intent: {}\n\nCandidates ({} options): {}\n\nPick the best {} product(s). Return JSON with 'items' array and 'notes'.",
        input.query,
        policy,
        slim.len(),
        Value::Array(slim),
        input.top_k
    )
}

#[async_trait]
impl RankingOracle for LlmRankingOracle {
    async fn rank(&self, input: RankingInput) -> Result<RankedSelection, ToolError> {
        if input.candidates.is_empty() {
            return Ok(RankedSelection {
                items: Vec::new(),
                notes: Some("No offers available for ranking.".to_string()),
            });
        }

        let raw = self
            .llm
            .complete(&CompletionRequest::json(RANKING_SYSTEM_PROMPT, user_prompt(&input)))
            .await
            .map_err(|error| ToolError::Llm(error.to_string()))?;
        let parsed: RankingResponse = serde_json::from_str(extract_json_object(&raw))
            .map_err(|error| ToolError::Decode(error.to_string()))?;

        let mut seen = BTreeSet::new();
        let items = parsed
            .items
            .into_iter()
            .filter_map(|item| {
                let link = item.link?.trim().to_string();
                let candidate =
                    input.candidates.iter().find(|candidate| candidate.offer.link == link)?;
                if !seen.insert(link) {
                    return None;
                }
                let reason = item
                    .reason
                    .map(|reason| reason.trim().to_string())
                    .filter(|reason| !reason.is_empty())
                    .unwrap_or_else(|| DEFAULT_REASON.to_string());
                Some(SelectedOffer { offer: candidate.offer.clone(), reason })
            })
            .take(input.top_k)
            .collect::<Vec<_>>();

        if items.is_empty() {
            return Err(ToolError::Decode(
                "ranking selected no link from the candidate list".to_string(),
            ));
        }

        let notes = parsed.notes.map(|notes| notes.trim().to_string()).filter(|n| !n.is_empty());
        Ok(RankedSelection { items, notes })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use async_trait::async_trait;
    use concierge_core::{Intent, Offer};

    use super::LlmRankingOracle;
    use crate::llm::{CompletionRequest, LlmClient};
    use crate::tools::{RankingCandidate, RankingInput, RankingOracle, ToolError};

    struct RecordingLlm {
        reply: &'static str,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(request.user.clone());
            }
            Ok(self.reply.to_string())
        }
    }

    fn input(top_k: usize) -> RankingInput {
        let trusted = Offer::new("iPhone 15 Pro", 4599.0, "SAR", "Jarir", "https://jarir.test/1", "s");
        let other = Offer::new("iPhone 15 Pro", 4300.0, "SAR", "Gadget Hub", "https://hub.test/2", "s");
        RankingInput {
            query: "iphone 15 pro".to_string(),
            intent: Intent::ready_for("iPhone 15 Pro"),
            candidates: vec![
                RankingCandidate { offer: trusted, is_trusted: true },
                RankingCandidate { offer: other, is_trusted: false },
            ],
            trusted_only: false,
            top_k,
        }
    }

    #[tokio::test]
    async fn maps_links_back_to_candidates_and_drops_unknown_ones() {
        let llm = Arc::new(RecordingLlm {
            reply: r#"{"items": [
                {"name": "Made up", "price": 1, "link": "https://invented.test/x", "reason": "cheap"},
                {"name": "iPhone 15 Pro", "price": 4599, "link": "https://jarir.test/1", "reason": "Trusted seller, new condition."},
                {"name": "iPhone 15 Pro", "price": 4300, "link": "https://hub.test/2", "reason": "Cheaper"}
            ], "notes": "Prices include VAT."}"#,
            prompts: Mutex::new(Vec::new()),
        });
        let oracle = LlmRankingOracle::new(llm.clone());

        let selection = oracle.rank(input(1)).await.expect("ranking succeeds");

        assert_eq!(selection.items.len(), 1);
        assert_eq!(selection.items[0].offer.retailer, "Jarir");
        assert_eq!(selection.items[0].reason, "Trusted seller, new condition.");
        assert_eq!(selection.notes.as_deref(), Some("Prices include VAT."));

        let prompts = llm.prompts.lock().map(|prompts| prompts.clone()).unwrap_or_default();
        assert!(prompts[0].contains("\"is_trusted\":true"));
        assert!(prompts[0].contains("Pick the best 1 product(s)"));
    }

    #[tokio::test]
    async fn selection_without_known_links_is_an_error() {
        let llm = Arc::new(RecordingLlm {
            reply: r#"{"items": [{"link": "https://invented.test/x", "reason": "cheap"}]}"#,
            prompts: Mutex::new(Vec::new()),
        });
        let error = LlmRankingOracle::new(llm).rank(input(1)).await.expect_err("should fail");
        assert!(matches!(error, ToolError::Decode(_)));
    }

    #[tokio::test]
    async fn malformed_reply_is_a_decode_error() {
        let llm = Arc::new(RecordingLlm { reply: "no json here", prompts: Mutex::new(Vec::new()) });
        let error = LlmRankingOracle::new(llm).rank(input(1)).await.expect_err("should fail");
        assert!(matches!(error, ToolError::Decode(_)));
    }
}
