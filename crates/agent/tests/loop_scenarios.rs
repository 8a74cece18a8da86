use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use concierge_agent::adapters::StaticRatePriceNormalizer;
use concierge_agent::finalizer::{BEST_AVAILABLE_REASON, NO_MATCH_NOTE, NO_TRUSTED_NOTE};
use concierge_agent::intent::{IntentError, IntentResolver};
use concierge_agent::runtime::NO_OFFERS_ERROR;
use concierge_agent::tools::{
    DetailFetcher, Enrichment, PageDetail, RankedSelection, RankingInput, RankingOracle,
    SearchTool, SpecEnricher, ToolBox, ToolError, ToolKind,
};
use concierge_agent::{AgentRuntime, RuntimeError};
use concierge_core::config::AgentConfig;
use concierge_core::{Condition, Intent, Offer, Request, SelectedOffer};

struct ScriptedResolver {
    intent: Result<Intent, &'static str>,
}

#[async_trait]
impl IntentResolver for ScriptedResolver {
    async fn resolve(&self, query: &str) -> Result<Intent, IntentError> {
        if query.trim().is_empty() {
            return Err(IntentError::EmptyQuery);
        }
        self.intent.clone().map_err(|message| IntentError::Oracle(message.to_string()))
    }
}

#[derive(Default)]
struct ScriptedSearch {
    offers: Vec<Offer>,
    fail: bool,
    queries: Mutex<Vec<String>>,
}

#[async_trait]
impl SearchTool for ScriptedSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Offer>, ToolError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        if self.fail {
            return Err(ToolError::Status { status: 503, body: "upstream down".to_string() });
        }
        Ok(self.offers.iter().take(limit).cloned().collect())
    }
}

/// Fills model and storage from the offer name, like a well-behaved LLM.
struct SpecFiller {
    calls: AtomicUsize,
}

#[async_trait]
impl SpecEnricher for SpecFiller {
    async fn enrich_batch(&self, items: &[Offer]) -> Vec<Enrichment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        items
            .iter()
            .map(|offer| Enrichment {
                brand: Some("Apple".to_string()),
                model: Some("iPhone 15 Pro Max".to_string()),
                storage: offer.name.contains("256").then(|| "256GB".to_string()),
                condition: Some(Condition::New),
            })
            .collect()
    }
}

struct CountingFetcher {
    calls: AtomicUsize,
}

#[async_trait]
impl DetailFetcher for CountingFetcher {
    async fn fetch_detail(&self, _url: &str) -> PageDetail {
        self.calls.fetch_add(1, Ordering::SeqCst);
        PageDetail::found(None, Some("256GB".to_string()))
    }
}

/// Picks the first candidate, or fails when told to.
struct FirstPickRanking {
    fail: bool,
    seen: Mutex<Vec<RankingInput>>,
}

#[async_trait]
impl RankingOracle for FirstPickRanking {
    async fn rank(&self, input: RankingInput) -> Result<RankedSelection, ToolError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(input.clone());
        }
        if self.fail {
            return Err(ToolError::Llm("oracle exploded".to_string()));
        }
        let items = input
            .candidates
            .iter()
            .take(input.top_k + 1)
            .map(|candidate| SelectedOffer {
                offer: candidate.offer.clone(),
                reason: "Trusted seller with the lowest price for a new unit.".to_string(),
            })
            .collect();
        Ok(RankedSelection { items, notes: None })
    }
}

struct Harness {
    search: Arc<ScriptedSearch>,
    enricher: Arc<SpecFiller>,
    fetcher: Arc<CountingFetcher>,
    ranking: Arc<FirstPickRanking>,
    runtime: AgentRuntime,
}

fn harness(
    intent: Result<Intent, &'static str>,
    search: ScriptedSearch,
    ranking_fails: bool,
    config: AgentConfig,
) -> Harness {
    let search = Arc::new(search);
    let enricher = Arc::new(SpecFiller { calls: AtomicUsize::new(0) });
    let fetcher = Arc::new(CountingFetcher { calls: AtomicUsize::new(0) });
    let ranking = Arc::new(FirstPickRanking { fail: ranking_fails, seen: Mutex::new(Vec::new()) });

    let tools = ToolBox {
        search: search.clone(),
        enricher: enricher.clone(),
        detail_fetcher: fetcher.clone(),
        price_normalizer: Arc::new(StaticRatePriceNormalizer::new(
            config.home_currency.clone(),
            config.fx_rates.clone(),
        )),
        ranking: ranking.clone(),
    };
    let runtime = AgentRuntime::new(Arc::new(ScriptedResolver { intent }), tools, &config);

    Harness { search, enricher, fetcher, ranking, runtime }
}

fn offer(name: &str, price: f64, retailer: &str, link: &str, condition: Condition) -> Offer {
    Offer::new(name, price, "SAR", retailer, link, "searchapi_google_shopping")
        .with_condition(condition)
}

fn iphone_offers() -> Vec<Offer> {
    vec![
        offer("iPhone 15 Pro Max 256GB", 4_899.0, "Gadget Hub", "https://hub.test/1", Condition::New),
        offer("iPhone 15 Pro Max 256GB", 5_099.0, "Jarir", "https://jarir.test/1", Condition::New),
        offer("iPhone 15 Pro Max 256GB", 4_999.0, "Noon.com", "https://noon.test/1", Condition::New),
    ]
}

#[tokio::test]
async fn budget_phone_asks_for_budget_without_executing_tools() {
    let h = harness(
        Ok(Intent::needs_answer("budget phone", "What's your budget?")),
        ScriptedSearch { offers: iphone_offers(), ..ScriptedSearch::default() },
        false,
        AgentConfig::default(),
    );

    let state = h.runtime.run(Request::new("budget phone")).await.expect("run succeeds");

    assert!(state.needs_clarification);
    assert_eq!(state.step_count, 0);
    assert_eq!(state.clarification_rounds, 1);
    let result = state.result();
    assert!(result.items.is_empty());
    assert_eq!(result.notes.as_deref(), Some("What's your budget?"));
    assert!(state.tried_tools.is_empty());
    assert!(h.search.queries.lock().map(|q| q.is_empty()).unwrap_or(false));
}

#[tokio::test]
async fn second_round_proceeds_with_best_effort() {
    let h = harness(
        Ok(Intent::needs_answer("budget phone", "What's your budget?")),
        ScriptedSearch { offers: iphone_offers(), ..ScriptedSearch::default() },
        false,
        AgentConfig::default(),
    );

    let request = Request::new("budget phone. around 1500 SAR").after_clarification();
    let state = h.runtime.run(request).await.expect("run succeeds");

    assert!(!state.needs_clarification);
    assert!(state.has_tried(ToolKind::Search));
    assert_eq!(state.intent.as_ref().map(|intent| intent.ready), Some(true));
    assert_eq!(state.result().items.len(), 1);
}

#[tokio::test]
async fn iphone_query_runs_search_enrich_price_then_ranks_one_item() {
    let h = harness(
        Ok(Intent::ready_for("iPhone 15 Pro Max 256GB")),
        ScriptedSearch { offers: iphone_offers(), ..ScriptedSearch::default() },
        false,
        AgentConfig::default(),
    );

    let state = h
        .runtime
        .run(Request::new("iPhone 15 Pro Max 256GB, budget 5000 SAR"))
        .await
        .expect("run succeeds");

    assert_eq!(state.step_count, 3);
    assert!(state.has_tried(ToolKind::Search));
    assert!(state.has_tried(ToolKind::SpecNormalizeBatch));
    assert!(!state.has_tried(ToolKind::PageFetchBatch));
    assert!(state.has_tried(ToolKind::PriceNormalizeBatch));
    assert_eq!(h.enricher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
    assert!(state.evidence.offers().iter().all(|offer| offer.price_sar.is_some()));
    assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);

    let queries = h.search.queries.lock().map(|q| q.clone()).unwrap_or_default();
    assert_eq!(queries, vec!["iPhone 15 Pro Max 256GB".to_string()]);

    let result = state.result();
    assert_eq!(result.items.len(), 1, "top_k = 1 caps the oracle output");
    assert_eq!(
        result.items[0].offer.retailer, "Noon.com",
        "cheapest trusted offer is pre-sorted first"
    );

    let seen = h.ranking.seen.lock().map(|seen| seen.clone()).unwrap_or_default();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].top_k, 1);
    assert_eq!(seen[0].candidates.len(), 3);
    assert!(!seen[0].candidates[2].is_trusted, "untrusted offers sort after trusted ones");
}

#[tokio::test]
async fn trusted_only_without_trusted_candidates_is_a_hard_stop() {
    let untrusted = vec![
        offer("TV 55", 1_999.0, "Gadget Hub", "https://hub.test/tv1", Condition::New),
        offer("TV 55", 1_899.0, "Souq Corner", "https://corner.test/tv2", Condition::New),
        offer("TV 55", 1_799.0, "Random Shop", "https://random.test/tv3", Condition::Used),
    ];
    let h = harness(
        Ok(Intent::ready_for("TV 55 inch")),
        ScriptedSearch { offers: untrusted, ..ScriptedSearch::default() },
        false,
        AgentConfig::default(),
    );

    let state =
        h.runtime.run(Request::new("tv 55").trusted_only(true)).await.expect("run succeeds");

    let result = state.result();
    assert!(result.items.is_empty());
    assert_eq!(result.notes.as_deref(), Some(NO_TRUSTED_NOTE));
    assert!(state.errors.iter().any(|error| error.contains("No trusted offers")));
    assert!(h.ranking.seen.lock().map(|seen| seen.is_empty()).unwrap_or(false));
}

#[tokio::test]
async fn ranking_failure_falls_back_to_first_presorted_candidate() {
    let offers = vec![
        offer("iPhone 15 Pro Max 256GB", 4_500.0, "Gadget Hub", "https://hub.test/1", Condition::New),
        offer("iPhone 15 Pro Max 256GB", 5_100.0, "Jarir", "https://jarir.test/1", Condition::New),
    ];
    let h = harness(
        Ok(Intent::ready_for("iPhone 15 Pro Max 256GB")),
        ScriptedSearch { offers, ..ScriptedSearch::default() },
        true,
        AgentConfig::default(),
    );

    let state = h.runtime.run(Request::new("iphone 15 pro max")).await.expect("run succeeds");

    let result = state.result();
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].offer.link, "https://jarir.test/1");
    assert_eq!(result.items[0].reason, BEST_AVAILABLE_REASON);
    assert!(state.errors.iter().any(|error| error.starts_with("ranking failed: ")));
}

#[tokio::test]
async fn step_ceiling_bounds_the_loop() {
    let config = AgentConfig { step_ceiling: 2, ..AgentConfig::default() };
    let h = harness(
        Ok(Intent::ready_for("iPhone 15 Pro Max")),
        ScriptedSearch { offers: iphone_offers(), ..ScriptedSearch::default() },
        false,
        config,
    );

    let state = h.runtime.run(Request::new("iphone 15 pro max")).await.expect("run succeeds");

    assert_eq!(state.step_count, 2);
    assert_eq!(state.tried_tools.len(), 2);
    assert!(!state.has_tried(ToolKind::PriceNormalizeBatch));
    assert_eq!(state.result().items.len(), 1);
}

#[tokio::test]
async fn detail_fetch_runs_when_enrichment_leaves_gaps() {
    let offers = vec![
        offer("iPhone 15 Pro Max", 4_899.0, "Jarir", "https://jarir.test/a", Condition::New),
        offer("iPhone 15 Pro Max", 4_999.0, "Noon.com", "https://noon.test/b", Condition::New),
    ];
    let h = harness(
        Ok(Intent::ready_for("iPhone 15 Pro Max")),
        ScriptedSearch { offers, ..ScriptedSearch::default() },
        false,
        AgentConfig::default(),
    );

    let state = h.runtime.run(Request::new("iphone 15 pro max")).await.expect("run succeeds");

    assert_eq!(state.step_count, 4);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);
    assert!(state.evidence.offers().iter().all(|offer| offer.storage.as_deref() == Some("256GB")));
}

#[tokio::test]
async fn failed_search_ends_with_no_offers_error() {
    let h = harness(
        Ok(Intent::ready_for("anything")),
        ScriptedSearch { fail: true, ..ScriptedSearch::default() },
        false,
        AgentConfig::default(),
    );

    let state = h.runtime.run(Request::new("anything")).await.expect("run succeeds");

    assert_eq!(state.step_count, 1);
    assert!(state.errors.iter().any(|error| error.starts_with("search: ")));
    assert!(state.errors.iter().any(|error| error == NO_OFFERS_ERROR));
    assert_eq!(state.result().notes.as_deref(), Some(NO_MATCH_NOTE));
}

#[tokio::test]
async fn duplicate_links_from_search_are_merged() {
    let mut duplicate = offer("iPhone 15 Pro Max 256GB", 5_099.0, "Jarir", "https://jarir.test/1", Condition::New);
    duplicate.image = Some("https://img.test/jarir.png".to_string());
    let mut offers = iphone_offers();
    offers.push(duplicate);
    let h = harness(
        Ok(Intent::ready_for("iPhone 15 Pro Max 256GB")),
        ScriptedSearch { offers, ..ScriptedSearch::default() },
        false,
        AgentConfig::default(),
    );

    let state = h.runtime.run(Request::new("iphone")).await.expect("run succeeds");

    let links = state.evidence.offers().iter().map(|offer| offer.link.as_str()).collect::<Vec<_>>();
    assert_eq!(links, vec!["https://hub.test/1", "https://jarir.test/1", "https://noon.test/1"]);
    assert_eq!(state.evidence.offers()[1].image.as_deref(), Some("https://img.test/jarir.png"));
}

#[tokio::test]
async fn intent_failure_aborts_the_turn() {
    let h = harness(
        Err("llm unavailable"),
        ScriptedSearch::default(),
        false,
        AgentConfig::default(),
    );

    let error = h.runtime.run(Request::new("laptop")).await.expect_err("run should fail");
    assert!(matches!(error, RuntimeError::IntentResolution(IntentError::Oracle(_))));

    let empty = h.runtime.run(Request::new("  ")).await.expect_err("empty query fails");
    assert!(matches!(empty, RuntimeError::IntentResolution(IntentError::EmptyQuery)));
}

#[tokio::test]
async fn concurrent_runs_share_adapters_but_not_state() {
    let h = harness(
        Ok(Intent::ready_for("iPhone 15 Pro Max 256GB")),
        ScriptedSearch { offers: iphone_offers(), ..ScriptedSearch::default() },
        false,
        AgentConfig::default(),
    );
    let runtime = Arc::new(h.runtime);

    let (first, second) = tokio::join!(
        runtime.run(Request::new("iphone a")),
        runtime.run(Request::new("iphone b"))
    );
    let first = first.expect("first run succeeds");
    let second = second.expect("second run succeeds");

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.step_count, 3);
    assert_eq!(second.step_count, 3);
    assert_eq!(h.enricher.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.search.queries.lock().map(|q| q.len()).unwrap_or(0), 2);
}
