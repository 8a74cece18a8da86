use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use concierge_core::{Intent, Offer, OfferPatch, SelectedOffer};
use serde::Serialize;
use thiserror::Error;

/// The fixed catalog of evidence-gathering tools. Each runs at most once per loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ToolKind {
    Search,
    SpecNormalizeBatch,
    PageFetchBatch,
    PriceNormalizeBatch,
}

impl ToolKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::SpecNormalizeBatch => "spec-normalize-batch",
            Self::PageFetchBatch => "page-fetch-batch",
            Self::PriceNormalizeBatch => "price-normalize-batch",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("http request failed: {0}")]
    Http(String),
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode upstream response: {0}")]
    Decode(String),
    #[error("unsupported input: {0}")]
    Unsupported(String),
    #[error("llm call failed: {0}")]
    Llm(String),
}

// Request URLs can carry credentials as query parameters, so they are
// stripped before the error is rendered.
impl From<reqwest::Error> for ToolError {
    fn from(error: reqwest::Error) -> Self {
        let error = error.without_url();
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Http(error.to_string())
        }
    }
}

/// Spec fields extracted from product text for one offer.
pub type Enrichment = OfferPatch;

/// Outcome of fetching one product page. Failures are carried in-band.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageDetail {
    pub ok: bool,
    pub model: Option<String>,
    pub storage: Option<String>,
    pub error: Option<String>,
}

impl PageDetail {
    pub fn found(model: Option<String>, storage: Option<String>) -> Self {
        Self { ok: true, model, storage, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { ok: false, model: None, storage: None, error: Some(error.into()) }
    }

    pub fn to_patch(&self) -> OfferPatch {
        OfferPatch {
            model: self.model.clone(),
            storage: self.storage.clone(),
            ..OfferPatch::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedPrice {
    pub price_sar: f64,
    pub currency: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RankingCandidate {
    pub offer: Offer,
    pub is_trusted: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RankingInput {
    pub query: String,
    pub intent: Intent,
    pub candidates: Vec<RankingCandidate>,
    pub trusted_only: bool,
    pub top_k: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RankedSelection {
    pub items: Vec<SelectedOffer>,
    pub notes: Option<String>,
}

#[async_trait]
pub trait SearchTool: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Offer>, ToolError>;
}

/// Returns exactly one enrichment per input, in input order. Internal
/// failures degrade every item to `condition = Unknown`.
#[async_trait]
pub trait SpecEnricher: Send + Sync {
    async fn enrich_batch(&self, items: &[Offer]) -> Vec<Enrichment>;
}

#[async_trait]
pub trait DetailFetcher: Send + Sync {
    async fn fetch_detail(&self, url: &str) -> PageDetail;
}

/// A missing currency means the home currency.
#[async_trait]
pub trait PriceNormalizer: Send + Sync {
    async fn normalize_price(
        &self,
        amount: f64,
        currency: Option<&str>,
    ) -> Result<NormalizedPrice, ToolError>;
}

#[async_trait]
pub trait RankingOracle: Send + Sync {
    async fn rank(&self, input: RankingInput) -> Result<RankedSelection, ToolError>;
}

/// Adapter set shared by every run. Adapters are read-only after startup.
#[derive(Clone)]
pub struct ToolBox {
    pub search: Arc<dyn SearchTool>,
    pub enricher: Arc<dyn SpecEnricher>,
    pub detail_fetcher: Arc<dyn DetailFetcher>,
    pub price_normalizer: Arc<dyn PriceNormalizer>,
    pub ranking: Arc<dyn RankingOracle>,
}
