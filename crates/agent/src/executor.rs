use futures::future::join_all;
use tracing::{debug, warn};

use crate::state::{Action, LoopState};
use crate::tools::{ToolBox, ToolKind};

/// Runs one planned action against the adapters and merges the outcome into
/// loop state. Adapter failures are logged into `state.errors`, never raised.
#[derive(Clone)]
pub struct Executor {
    tools: ToolBox,
}

impl Executor {
    pub fn new(tools: ToolBox) -> Self {
        Self { tools }
    }

    pub async fn apply(&self, state: &mut LoopState, action: Action) {
        let kind = action.kind();
        state.tried_tools.insert(kind);

        match action {
            Action::Search { query, limit } => self.search(state, &query, limit).await,
            Action::Enrich => self.enrich(state).await,
            Action::FetchDetails { links } => self.fetch_details(state, links).await,
            Action::NormalizePrices => self.normalize_prices(state).await,
        }
    }

    async fn search(&self, state: &mut LoopState, query: &str, limit: usize) {
        match self.tools.search.search(query, limit).await {
            Ok(offers) => {
                debug!(
                    event_name = "agent.tool.search",
                    correlation_id = %state.run_id,
                    found = offers.len(),
                    "search returned offers"
                );
                state.evidence.extend(offers);
            }
            Err(error) => {
                warn!(
                    event_name = "agent.tool.failed",
                    correlation_id = %state.run_id,
                    tool = ToolKind::Search.name(),
                    error = %error,
                    "tool call failed"
                );
                state.record_tool_error(ToolKind::Search, error);
            }
        }
    }

    async fn enrich(&self, state: &mut LoopState) {
        if state.evidence.is_empty() {
            return;
        }

        let enrichments = self.tools.enricher.enrich_batch(state.evidence.offers()).await;
        if enrichments.len() != state.evidence.len() {
            warn!(
                event_name = "agent.tool.enrich.mismatch",
                correlation_id = %state.run_id,
                expected = state.evidence.len(),
                received = enrichments.len(),
                "enrichment batch size mismatch, applying the overlap"
            );
        }

        for (offer, enrichment) in state.evidence.offers_mut().iter_mut().zip(&enrichments) {
            offer.apply_patch(enrichment);
        }
    }

    async fn fetch_details(&self, state: &mut LoopState, links: Vec<String>) {
        let fetcher = &self.tools.detail_fetcher;
        let details = join_all(links.iter().map(|link| fetcher.fetch_detail(link))).await;

        for (link, detail) in links.iter().zip(details) {
            if !detail.ok {
                debug!(
                    event_name = "agent.tool.page_fetch.degraded",
                    correlation_id = %state.run_id,
                    link = %link,
                    error = detail.error.as_deref().unwrap_or("unknown"),
                    "detail page unavailable"
                );
                continue;
            }
            state.evidence.patch_by_link(link, &detail.to_patch());
        }
    }

    async fn normalize_prices(&self, state: &mut LoopState) {
        let normalizer = &self.tools.price_normalizer;
        let mut failures = Vec::new();

        for offer in state.evidence.offers_mut().iter_mut().filter(|offer| offer.price_sar.is_none())
        {
            let currency = Some(offer.currency.as_str()).filter(|code| !code.trim().is_empty());
            match normalizer.normalize_price(offer.price, currency).await {
                Ok(normalized) => {
                    offer.price_sar = Some(normalized.price_sar);
                    offer.currency = normalized.currency;
                }
                Err(error) => failures.push(format!("{}: {error}", offer.link)),
            }
        }

        for failure in failures {
            warn!(
                event_name = "agent.tool.failed",
                correlation_id = %state.run_id,
                tool = ToolKind::PriceNormalizeBatch.name(),
                error = %failure,
                "price normalization failed for one offer"
            );
            state.record_tool_error(ToolKind::PriceNormalizeBatch, failure);
        }
    }
}
