use std::collections::{BTreeSet, HashMap};

use concierge_core::{Intent, Offer, OfferPatch, Request, ShoppingResult};
use uuid::Uuid;

use crate::tools::ToolKind;

/// Unit of work chosen by the planner for one step.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Search { query: String, limit: usize },
    Enrich,
    FetchDetails { links: Vec<String> },
    NormalizePrices,
}

impl Action {
    pub fn kind(&self) -> ToolKind {
        match self {
            Self::Search { .. } => ToolKind::Search,
            Self::Enrich => ToolKind::SpecNormalizeBatch,
            Self::FetchDetails { .. } => ToolKind::PageFetchBatch,
            Self::NormalizePrices => ToolKind::PriceNormalizeBatch,
        }
    }
}

/// Offers gathered so far, in first-seen order.
///
/// Appends are unchecked; [`EvidenceStore::canonicalize`] restores one record
/// per link. The reconciler runs it after every step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvidenceStore {
    offers: Vec<Offer>,
}

impl EvidenceStore {
    pub fn extend(&mut self, offers: impl IntoIterator<Item = Offer>) {
        self.offers.extend(offers);
    }

    pub fn push(&mut self, offer: Offer) {
        self.offers.push(offer);
    }

    pub fn offers(&self) -> &[Offer] {
        &self.offers
    }

    pub fn offers_mut(&mut self) -> &mut [Offer] {
        &mut self.offers
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }

    /// Applies `patch` to every record carrying `link`.
    pub fn patch_by_link(&mut self, link: &str, patch: &OfferPatch) -> bool {
        let mut matched = false;
        for offer in self.offers.iter_mut().filter(|offer| offer.link == link) {
            offer.apply_patch(patch);
            matched = true;
        }
        matched
    }

    /// Drops link-less records and folds later duplicates into the first
    /// record with the same link.
    pub fn canonicalize(&mut self) {
        let mut index_by_link: HashMap<String, usize> = HashMap::new();
        let mut canonical: Vec<Offer> = Vec::with_capacity(self.offers.len());

        for offer in self.offers.drain(..) {
            if !offer.has_link() {
                continue;
            }
            match index_by_link.get(&offer.link) {
                Some(&index) => canonical[index].absorb(offer),
                None => {
                    index_by_link.insert(offer.link.clone(), canonical.len());
                    canonical.push(offer);
                }
            }
        }

        self.offers = canonical;
    }
}

/// Everything one loop run knows. Owned by that run only.
#[derive(Clone, Debug)]
pub struct LoopState {
    pub run_id: Uuid,
    pub request: Request,
    pub intent: Option<Intent>,
    pub evidence: EvidenceStore,
    pub tried_tools: BTreeSet<ToolKind>,
    pub step_count: u32,
    pub done: bool,
    pub errors: Vec<String>,
    pub needs_clarification: bool,
    pub clarification_rounds: u8,
    pub pending_action: Option<Action>,
    pub result: Option<ShoppingResult>,
}

impl LoopState {
    pub fn new(request: Request) -> Self {
        Self::with_run_id(request, Uuid::new_v4())
    }

    /// Starts a run under a caller-chosen id, so transport logs and loop
    /// logs share one correlation id.
    pub fn with_run_id(request: Request, run_id: Uuid) -> Self {
        let clarification_rounds = request.clarification_rounds.min(1);
        Self {
            run_id,
            request,
            intent: None,
            evidence: EvidenceStore::default(),
            tried_tools: BTreeSet::new(),
            step_count: 0,
            done: false,
            errors: Vec::new(),
            needs_clarification: false,
            clarification_rounds,
            pending_action: None,
            result: None,
        }
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn has_tried(&self, kind: ToolKind) -> bool {
        self.tried_tools.contains(&kind)
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn record_tool_error(&mut self, kind: ToolKind, message: impl std::fmt::Display) {
        self.errors.push(format!("{kind}: {message}"));
    }

    pub fn result(&self) -> ShoppingResult {
        self.result.clone().unwrap_or_default()
    }
}
