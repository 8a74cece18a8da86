use concierge_core::config::AgentConfig;
use concierge_core::DEFAULT_FOLLOW_UP_QUESTION;

use crate::state::{Action, LoopState};
use crate::tools::ToolKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Searching,
    Enriching,
    DetailFetching,
    PriceNormalizing,
    Terminated,
}

impl Phase {
    /// The first phase whose tool has not run yet.
    fn current(state: &LoopState) -> Self {
        [
            (ToolKind::Search, Self::Searching),
            (ToolKind::SpecNormalizeBatch, Self::Enriching),
            (ToolKind::PageFetchBatch, Self::DetailFetching),
            (ToolKind::PriceNormalizeBatch, Self::PriceNormalizing),
        ]
        .into_iter()
        .find(|(kind, _)| !state.has_tried(*kind))
        .map(|(_, phase)| phase)
        .unwrap_or(Self::Terminated)
    }

    fn next(self) -> Self {
        match self {
            Self::Searching => Self::Enriching,
            Self::Enriching => Self::DetailFetching,
            Self::DetailFetching => Self::PriceNormalizing,
            Self::PriceNormalizing | Self::Terminated => Self::Terminated,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    StepCeiling,
    NoOffers,
    Exhausted,
}

impl TerminationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StepCeiling => "step_ceiling",
            Self::NoOffers => "no_offers",
            Self::Exhausted => "exhausted",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    Act(Action),
    Clarify(String),
    Terminate(TerminationReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanError {
    MissingIntent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlannerLimits {
    pub step_ceiling: u32,
    pub search_limit: usize,
    pub detail_fetch_limit: usize,
}

impl Default for PlannerLimits {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for PlannerLimits {
    fn from(config: &AgentConfig) -> Self {
        Self {
            step_ceiling: config.step_ceiling,
            search_limit: config.search_limit,
            detail_fetch_limit: config.detail_fetch_limit,
        }
    }
}

enum Transition {
    Advance(Phase),
    Decide(Decision),
}

/// Pure decision policy over loop state.
#[derive(Clone, Debug, Default)]
pub struct Planner {
    limits: PlannerLimits,
}

impl Planner {
    pub fn new(limits: PlannerLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> PlannerLimits {
        self.limits
    }

    pub fn next(&self, state: &LoopState) -> Result<Decision, PlanError> {
        let intent = state.intent.as_ref().ok_or(PlanError::MissingIntent)?;

        // After one clarification round an unready intent proceeds as ready.
        if !intent.ready && state.clarification_rounds < 1 {
            let question = intent
                .follow_up_question
                .clone()
                .unwrap_or_else(|| DEFAULT_FOLLOW_UP_QUESTION.to_string());
            return Ok(Decision::Clarify(question));
        }

        if state.step_count >= self.limits.step_ceiling {
            return Ok(Decision::Terminate(TerminationReason::StepCeiling));
        }

        if state.has_tried(ToolKind::Search) && state.evidence.is_empty() {
            return Ok(Decision::Terminate(TerminationReason::NoOffers));
        }

        let mut phase = Phase::current(state);
        loop {
            match self.transition(phase, state, &intent.canonical_search_query) {
                Transition::Advance(next) => phase = next,
                Transition::Decide(decision) => return Ok(decision),
            }
        }
    }

    fn transition(&self, phase: Phase, state: &LoopState, query: &str) -> Transition {
        let offers = state.evidence.offers();
        match phase {
            Phase::Searching => Transition::Decide(Decision::Act(Action::Search {
                query: query.to_string(),
                limit: self.limits.search_limit,
            })),
            Phase::Enriching => Transition::Decide(Decision::Act(Action::Enrich)),
            Phase::DetailFetching => {
                let links = offers
                    .iter()
                    .filter(|offer| offer.has_link() && offer.lacks_detail())
                    .take(self.limits.detail_fetch_limit)
                    .map(|offer| offer.link.clone())
                    .collect::<Vec<_>>();
                if links.is_empty() {
                    Transition::Advance(phase.next())
                } else {
                    Transition::Decide(Decision::Act(Action::FetchDetails { links }))
                }
            }
            Phase::PriceNormalizing => {
                if offers.iter().any(|offer| offer.price_sar.is_none()) {
                    Transition::Decide(Decision::Act(Action::NormalizePrices))
                } else {
                    Transition::Advance(phase.next())
                }
            }
            Phase::Terminated => {
                Transition::Decide(Decision::Terminate(TerminationReason::Exhausted))
            }
        }
    }
}
