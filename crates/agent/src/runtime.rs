use std::sync::Arc;

use concierge_core::config::{AgentConfig, AppConfig};
use concierge_core::{ApplicationError, DomainError, Request, TrustList};
use thiserror::Error;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::adapters::{
    HttpDetailFetcher, LlmRankingOracle, LlmSpecEnricher, SearchApiShopping,
    StaticRatePriceNormalizer,
};
use crate::executor::Executor;
use crate::finalizer::Finalizer;
use crate::intent::{IntentError, IntentResolver, LlmIntentResolver};
use crate::llm::{HttpLlmClient, LlmClient};
use crate::planner::{Decision, PlanError, Planner, PlannerLimits, TerminationReason};
use crate::reconciler::reconcile;
use crate::state::LoopState;
use crate::tools::{ToolBox, ToolError};

pub const NO_OFFERS_ERROR: &str = "No offers found from search";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("llm client could not be built: {0}")]
    Llm(String),
    #[error(transparent)]
    Tool(#[from] ToolError),
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    IntentResolution(#[from] IntentError),
    #[error("planner invoked without a resolved intent")]
    MissingIntent,
}

impl From<PlanError> for RuntimeError {
    fn from(error: PlanError) -> Self {
        match error {
            PlanError::MissingIntent => Self::MissingIntent,
        }
    }
}

impl From<BuildError> for ApplicationError {
    fn from(error: BuildError) -> Self {
        Self::Configuration(error.to_string())
    }
}

impl From<RuntimeError> for ApplicationError {
    fn from(error: RuntimeError) -> Self {
        match error {
            RuntimeError::IntentResolution(IntentError::EmptyQuery) => {
                Self::Domain(DomainError::EmptyQuery)
            }
            RuntimeError::IntentResolution(error) => Self::IntentResolution(error.to_string()),
            RuntimeError::MissingIntent => Self::Domain(DomainError::InvariantViolation(
                RuntimeError::MissingIntent.to_string(),
            )),
        }
    }
}

/// Loop controller: resolve intent, then plan, execute and reconcile until
/// the planner stops, then finalize. Shared across concurrent runs.
pub struct AgentRuntime {
    resolver: Arc<dyn IntentResolver>,
    planner: Planner,
    executor: Executor,
    finalizer: Finalizer,
}

impl AgentRuntime {
    pub fn new(resolver: Arc<dyn IntentResolver>, tools: ToolBox, config: &AgentConfig) -> Self {
        let trust = TrustList::new(&config.trusted_retailers);
        Self {
            resolver,
            planner: Planner::new(PlannerLimits::from(config)),
            finalizer: Finalizer::new(tools.ranking.clone(), trust, config),
            executor: Executor::new(tools),
        }
    }

    /// Wires the HTTP and LLM-backed adapters described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, BuildError> {
        let llm: Arc<dyn LlmClient> = Arc::new(
            HttpLlmClient::from_config(&config.llm)
                .map_err(|error| BuildError::Llm(error.to_string()))?,
        );
        let agent = &config.agent;

        let tools = ToolBox {
            search: Arc::new(SearchApiShopping::from_config(&config.search, &agent.home_currency)?),
            enricher: Arc::new(LlmSpecEnricher::new(llm.clone())),
            detail_fetcher: Arc::new(HttpDetailFetcher::new(agent.fetch_timeout_secs)?),
            price_normalizer: Arc::new(StaticRatePriceNormalizer::new(
                agent.home_currency.clone(),
                agent.fx_rates.clone(),
            )),
            ranking: Arc::new(LlmRankingOracle::new(llm.clone())),
        };

        Ok(Self::new(Arc::new(LlmIntentResolver::new(llm)), tools, agent))
    }

    pub fn step_ceiling(&self) -> u32 {
        self.planner.limits().step_ceiling
    }

    pub fn trust(&self) -> &TrustList {
        self.finalizer.trust()
    }

    pub async fn run(&self, request: Request) -> Result<LoopState, RuntimeError> {
        self.run_with_id(request, Uuid::new_v4()).await
    }

    pub async fn run_with_id(
        &self,
        request: Request,
        run_id: Uuid,
    ) -> Result<LoopState, RuntimeError> {
        let state = LoopState::with_run_id(request, run_id);
        let span = info_span!("agent.run", correlation_id = %state.run_id);
        self.drive(state).instrument(span).await
    }

    async fn drive(&self, mut state: LoopState) -> Result<LoopState, RuntimeError> {
        info!(
            event_name = "agent.loop.started",
            correlation_id = %state.run_id,
            trusted_only = state.request.trusted_only,
            clarification_rounds = state.clarification_rounds,
            "shopping loop started"
        );

        let mut intent = self.resolver.resolve(&state.request.query).await?;
        if !intent.ready && state.clarification_rounds >= 1 {
            debug!(
                event_name = "agent.intent.forced_ready",
                correlation_id = %state.run_id,
                "clarification already asked, proceeding with best effort"
            );
            intent.force_ready();
        }
        state.intent = Some(intent);

        while !state.done {
            let decision = self.planner.next(&state)?;
            debug!(
                event_name = "agent.loop.decision",
                correlation_id = %state.run_id,
                step = state.step_count,
                decision = ?decision,
                "planner decided"
            );

            match decision {
                Decision::Act(action) => {
                    let tool = action.kind();
                    state.pending_action = Some(action.clone());
                    self.executor.apply(&mut state, action).await;
                    reconcile(&mut state);
                    info!(
                        event_name = "agent.loop.step",
                        correlation_id = %state.run_id,
                        step = state.step_count,
                        tool = tool.name(),
                        evidence = state.evidence.len(),
                        "loop step completed"
                    );
                }
                Decision::Clarify(question) => {
                    info!(
                        event_name = "agent.loop.clarify",
                        correlation_id = %state.run_id,
                        question = %question,
                        "asking the user for more detail"
                    );
                    state.needs_clarification = true;
                    state.clarification_rounds = state.clarification_rounds.saturating_add(1).min(1);
                    state.done = true;
                }
                Decision::Terminate(reason) => {
                    if reason == TerminationReason::NoOffers {
                        state.record_error(NO_OFFERS_ERROR);
                    }
                    info!(
                        event_name = "agent.loop.terminated",
                        correlation_id = %state.run_id,
                        reason = reason.as_str(),
                        steps = state.step_count,
                        "planner terminated the loop"
                    );
                    state.done = true;
                }
            }
        }

        self.finalizer.finalize(&mut state).await;

        info!(
            event_name = "agent.loop.finished",
            correlation_id = %state.run_id,
            steps = state.step_count,
            errors = state.errors.len(),
            items = state.result.as_ref().map(|result| result.items.len()).unwrap_or(0),
            needs_clarification = state.needs_clarification,
            "shopping loop finished"
        );
        Ok(state)
    }
}
