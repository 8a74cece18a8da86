use std::cmp::Ordering;
use std::sync::Arc;

use concierge_core::config::AgentConfig;
use concierge_core::{
    Intent, Offer, SelectedOffer, ShoppingResult, TrustList, DEFAULT_FOLLOW_UP_QUESTION,
};
use tracing::{info, warn};

use crate::state::LoopState;
use crate::tools::{RankingCandidate, RankingInput, RankingOracle};

pub const BEST_AVAILABLE_REASON: &str = "Best available option";
pub const NO_TRUSTED_NOTE: &str = "No trusted offers matched the query.";
pub const NO_TRUSTED_ERROR: &str = "No trusted offers found";
pub const NO_MATCH_NOTE: &str = "No matching offers found after filtering.";

const RAW_FALLBACK_LIMIT: usize = 5;
const MISSING_PRICE_SENTINEL: f64 = 9e9;

/// Turns gathered evidence into the final result. Never fails: ranking
/// errors fall back to the first pre-sorted candidate.
pub struct Finalizer {
    ranking: Arc<dyn RankingOracle>,
    trust: TrustList,
    rank_pool: usize,
    top_k: usize,
}

impl Finalizer {
    pub fn new(ranking: Arc<dyn RankingOracle>, trust: TrustList, config: &AgentConfig) -> Self {
        Self { ranking, trust, rank_pool: config.rank_pool.max(1), top_k: config.top_k.max(1) }
    }

    pub fn trust(&self) -> &TrustList {
        &self.trust
    }

    pub async fn finalize(&self, state: &mut LoopState) {
        if state.needs_clarification {
            let question = state
                .intent
                .as_ref()
                .and_then(|intent| intent.follow_up_question.clone())
                .unwrap_or_else(|| DEFAULT_FOLLOW_UP_QUESTION.to_string());
            state.result = Some(ShoppingResult::empty_with_note(question));
            return;
        }

        let result = self.select(state).await;
        state.result = Some(result);
        state.needs_clarification = false;
    }

    async fn select(&self, state: &mut LoopState) -> ShoppingResult {
        let candidates = state
            .evidence
            .offers()
            .iter()
            .filter(|offer| offer.has_link() && offer.effective_price().is_some())
            .map(|offer| self.candidate(offer))
            .collect::<Vec<_>>();
        let trusted = candidates
            .iter()
            .filter(|candidate| candidate.is_trusted)
            .cloned()
            .collect::<Vec<_>>();

        let trusted_only = state.request.trusted_only;
        if trusted_only && trusted.is_empty() {
            state.record_error(NO_TRUSTED_ERROR);
            return ShoppingResult::empty_with_note(NO_TRUSTED_NOTE);
        }

        let mut base = if trusted_only { trusted } else { candidates };
        if base.is_empty() {
            base = state
                .evidence
                .offers()
                .iter()
                .take(RAW_FALLBACK_LIMIT)
                .map(|offer| self.candidate(offer))
                .collect();
        }
        if base.is_empty() {
            return ShoppingResult::empty_with_note(NO_MATCH_NOTE);
        }

        presort(&mut base);
        let pool = base.iter().take(self.rank_pool).cloned().collect::<Vec<_>>();
        let input = RankingInput {
            query: state.request.query.clone(),
            intent: state
                .intent
                .clone()
                .unwrap_or_else(|| Intent::ready_for(state.request.query.clone())),
            candidates: pool,
            trusted_only,
            top_k: self.top_k,
        };

        match self.ranking.rank(input).await {
            Ok(mut selection) => {
                selection.items.truncate(self.top_k);
                info!(
                    event_name = "agent.finalize.ranked",
                    correlation_id = %state.run_id,
                    selected = selection.items.len(),
                    "ranking oracle selected offers"
                );
                ShoppingResult { items: selection.items, notes: selection.notes }
            }
            Err(error) => {
                warn!(
                    event_name = "agent.finalize.ranking_fallback",
                    correlation_id = %state.run_id,
                    error = %error,
                    "ranking failed, using best pre-sorted candidate"
                );
                state.record_error(format!("ranking failed: {error}"));
                let items = base
                    .into_iter()
                    .next()
                    .map(|candidate| SelectedOffer {
                        offer: candidate.offer,
                        reason: BEST_AVAILABLE_REASON.to_string(),
                    })
                    .into_iter()
                    .collect();
                ShoppingResult { items, notes: None }
            }
        }
    }

    fn candidate(&self, offer: &Offer) -> RankingCandidate {
        RankingCandidate { is_trusted: self.trust.contains(&offer.retailer), offer: offer.clone() }
    }
}

/// Stable order: trusted first, then condition (New, Refurbished, Used,
/// Unknown), then ascending price with missing prices last.
pub fn presort(candidates: &mut [RankingCandidate]) {
    candidates.sort_by(|left, right| presort_key(left).cmp_key(&presort_key(right)));
}

struct PresortKey {
    untrusted: u8,
    condition: u8,
    price: f64,
}

impl PresortKey {
    fn cmp_key(&self, other: &Self) -> Ordering {
        self.untrusted
            .cmp(&other.untrusted)
            .then(self.condition.cmp(&other.condition))
            .then(self.price.total_cmp(&other.price))
    }
}

fn presort_key(candidate: &RankingCandidate) -> PresortKey {
    PresortKey {
        untrusted: u8::from(!candidate.is_trusted),
        condition: candidate.offer.condition_or_unknown().rank(),
        price: candidate.offer.effective_price().unwrap_or(MISSING_PRICE_SENTINEL),
    }
}
