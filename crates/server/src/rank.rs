use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use concierge_agent::AgentRuntime;
use concierge_core::{ApplicationError, DomainError, InterfaceError, Request, ShoppingResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct RankState {
    runtime: Arc<AgentRuntime>,
}

impl RankState {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RankRequest {
    pub query: String,
    #[serde(default = "default_trusted_only")]
    pub trusted_only: bool,
    #[serde(default)]
    pub clarification_rounds: u8,
}

fn default_trusted_only() -> bool {
    true
}

impl From<RankRequest> for Request {
    fn from(value: RankRequest) -> Self {
        Self {
            query: value.query,
            trusted_only: value.trusted_only,
            clarification_rounds: value.clarification_rounds,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankResponse {
    pub query: String,
    pub steps: u32,
    pub errors: Vec<String>,
    pub needs_clarification: bool,
    pub result: ShoppingResult,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

impl From<&InterfaceError> for ErrorBody {
    fn from(value: &InterfaceError) -> Self {
        Self {
            error: value.user_message().to_string(),
            correlation_id: value.correlation_id().to_string(),
        }
    }
}

pub type RankReply = Result<(StatusCode, Json<RankResponse>), (StatusCode, Json<ErrorBody>)>;

pub fn router(state: RankState) -> Router {
    Router::new().route("/api/v1/rank", post(rank)).with_state(state)
}

pub async fn rank(State(state): State<RankState>, Json(body): Json<RankRequest>) -> RankReply {
    if body.query.trim().is_empty() {
        let error = ApplicationError::from(DomainError::EmptyQuery)
            .into_interface(Uuid::new_v4().to_string());
        return Err(reject(error));
    }

    let run_id = Uuid::new_v4();
    let request = Request::from(body);
    let query = request.query.clone();
    match state.runtime.run_with_id(request, run_id).await {
        Ok(run) => {
            info!(
                event_name = "server.rank.completed",
                correlation_id = %run.run_id,
                steps = run.step_count,
                errors = run.errors.len(),
                needs_clarification = run.needs_clarification,
                "rank request completed"
            );
            let result = run.result.clone().unwrap_or_default();
            Ok((
                StatusCode::OK,
                Json(RankResponse {
                    query,
                    steps: run.step_count,
                    errors: run.errors,
                    needs_clarification: run.needs_clarification,
                    result,
                }),
            ))
        }
        Err(error) => {
            let interface = ApplicationError::from(error).into_interface(run_id.to_string());
            Err(reject(interface))
        }
    }
}

/// The full error stays in the server log; clients get the fixed user
/// message and the correlation id to quote.
fn reject(error: InterfaceError) -> (StatusCode, Json<ErrorBody>) {
    let status = match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "server.rank.rejected",
        correlation_id = %error.correlation_id(),
        status = status.as_u16(),
        error = %error,
        "rank request rejected"
    );
    (status, Json(ErrorBody::from(&error)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::{extract::State, Json};
    use concierge_agent::intent::{IntentError, IntentResolver};
    use concierge_agent::tools::{
        DetailFetcher, Enrichment, NormalizedPrice, PageDetail, PriceNormalizer, RankedSelection,
        RankingInput, RankingOracle, SearchTool, SpecEnricher, ToolBox, ToolError,
    };
    use concierge_agent::AgentRuntime;
    use concierge_core::config::AgentConfig;
    use concierge_core::{Condition, Intent, Offer, SelectedOffer};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::rank::{rank, router, RankRequest, RankState};

    struct FixedResolver {
        intent: Option<Intent>,
    }

    #[async_trait]
    impl IntentResolver for FixedResolver {
        async fn resolve(&self, query: &str) -> Result<Intent, IntentError> {
            if query.trim().is_empty() {
                return Err(IntentError::EmptyQuery);
            }
            self.intent.clone().ok_or_else(|| IntentError::Oracle("llm timeout".to_string()))
        }
    }

    struct OneOffer;

    #[async_trait]
    impl SearchTool for OneOffer {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<Offer>, ToolError> {
            let mut offer = Offer::new(
                "iPhone 15 Pro Max 256GB",
                4_899.0,
                "SAR",
                "Jarir",
                "https://jarir.example/iphone",
                "search",
            )
            .with_condition(Condition::New);
            offer.brand = Some("Apple".to_string());
            offer.model = Some("iPhone 15 Pro Max".to_string());
            offer.storage = Some("256GB".to_string());
            Ok(vec![offer])
        }
    }

    struct NoopEnricher;

    #[async_trait]
    impl SpecEnricher for NoopEnricher {
        async fn enrich_batch(&self, items: &[Offer]) -> Vec<Enrichment> {
            items.iter().map(|_| Enrichment::default()).collect()
        }
    }

    struct NoopFetcher;

    #[async_trait]
    impl DetailFetcher for NoopFetcher {
        async fn fetch_detail(&self, _url: &str) -> PageDetail {
            PageDetail::failed("offline")
        }
    }

    struct SarOnly;

    #[async_trait]
    impl PriceNormalizer for SarOnly {
        async fn normalize_price(
            &self,
            amount: f64,
            _currency: Option<&str>,
        ) -> Result<NormalizedPrice, ToolError> {
            Ok(NormalizedPrice { price_sar: amount, currency: "SAR".to_string() })
        }
    }

    struct FirstPick;

    #[async_trait]
    impl RankingOracle for FirstPick {
        async fn rank(&self, input: RankingInput) -> Result<RankedSelection, ToolError> {
            let items = input
                .candidates
                .into_iter()
                .take(input.top_k)
                .map(|candidate| SelectedOffer {
                    offer: candidate.offer,
                    reason: "Trusted seller, new unit.".to_string(),
                })
                .collect();
            Ok(RankedSelection { items, notes: None })
        }
    }

    fn state(intent: Option<Intent>) -> RankState {
        let tools = ToolBox {
            search: Arc::new(OneOffer),
            enricher: Arc::new(NoopEnricher),
            detail_fetcher: Arc::new(NoopFetcher),
            price_normalizer: Arc::new(SarOnly),
            ranking: Arc::new(FirstPick),
        };
        let runtime =
            AgentRuntime::new(Arc::new(FixedResolver { intent }), tools, &AgentConfig::default());
        RankState::new(Arc::new(runtime))
    }

    fn body(query: &str) -> RankRequest {
        RankRequest { query: query.to_string(), trusted_only: true, clarification_rounds: 0 }
    }

    #[tokio::test]
    async fn rank_returns_selected_offer() {
        let reply = rank(
            State(state(Some(Intent::ready_for("iPhone 15 Pro Max 256GB")))),
            Json(body("iphone 15 pro max 256")),
        )
        .await;

        let (status, Json(payload)) = reply.expect("rank should succeed");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.query, "iphone 15 pro max 256");
        assert!(!payload.needs_clarification);
        assert!(payload.steps >= 1);
        assert_eq!(payload.result.items.len(), 1);
        assert_eq!(payload.result.items[0].offer.retailer, "Jarir");
    }

    #[tokio::test]
    async fn rank_surfaces_clarification_question() {
        let intent = Intent::needs_answer("phone", "What is your budget in SAR?");
        let reply = rank(State(state(Some(intent))), Json(body("phone"))).await;

        let (status, Json(payload)) = reply.expect("clarification is a successful reply");
        assert_eq!(status, StatusCode::OK);
        assert!(payload.needs_clarification);
        assert_eq!(payload.steps, 0);
        assert!(payload.result.items.is_empty());
        assert_eq!(payload.result.notes.as_deref(), Some("What is your budget in SAR?"));
    }

    #[tokio::test]
    async fn rank_rejects_blank_query() {
        let reply = rank(State(state(None)), Json(body("   "))).await;

        let (status, Json(error)) = reply.expect_err("blank query is rejected");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!error.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn rank_maps_intent_failure_to_service_unavailable() {
        let reply = rank(State(state(None)), Json(body("laptop"))).await;

        let (status, Json(error)) = reply.expect_err("intent failure is surfaced");
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            error.error,
            "The shopping assistant is temporarily unavailable. Please retry shortly."
        );
        assert!(Uuid::parse_str(&error.correlation_id).is_ok());
    }

    #[tokio::test]
    async fn error_body_carries_no_internal_detail() {
        let app = router(state(None));
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/api/v1/rank")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"query":"laptop"}"#))
            .expect("request builds");

        let response = app.oneshot(request).await.expect("router responds");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body is readable");
        let payload: serde_json::Value = serde_json::from_slice(&bytes).expect("json error body");
        let fields = payload.as_object().expect("error body is an object");
        assert_eq!(fields.len(), 2);
        assert!(fields.contains_key("error"));
        assert!(fields.contains_key("correlation_id"));
        assert!(!String::from_utf8_lossy(&bytes).contains("llm timeout"));
    }

    #[tokio::test]
    async fn router_defaults_trusted_only_for_minimal_body() {
        let app = router(state(Some(Intent::ready_for("iPhone 15 Pro Max 256GB"))));
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/api/v1/rank")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"query":"iphone 15 pro max"}"#))
            .expect("request builds");

        let response = app.oneshot(request).await.expect("router responds");

        assert_eq!(response.status(), StatusCode::OK);
    }
}
