use std::fmt;

use serde::{Deserialize, Serialize};

/// Item condition as reported by a retailer, ordered best-first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Condition {
    New,
    Refurbished,
    Used,
    Unknown,
}

impl Condition {
    /// Lenient parse of free-form retailer text. Blank input yields `None`,
    /// anything unrecognized yields `Unknown`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }

        if normalized.starts_with("new")
            || normalized == "brand new"
            || normalized.contains("جديد")
        {
            return Some(Self::New);
        }
        if normalized.contains("refurb")
            || normalized.contains("renewed")
            || normalized.contains("مجدد")
            || normalized.contains("مجدَّد")
        {
            return Some(Self::Refurbished);
        }
        if normalized.starts_with("used")
            || normalized.contains("pre-owned")
            || normalized.contains("مستعمل")
        {
            return Some(Self::Used);
        }

        Some(Self::Unknown)
    }

    pub fn rank(self) -> u8 {
        match self {
            Self::New => 0,
            Self::Refurbished => 1,
            Self::Used => 2,
            Self::Unknown => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Refurbished => "Refurbished",
            Self::Used => "Used",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate listing. `link` is the identity key: two offers with the
/// same link describe the same entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub name: String,
    pub price: f64,
    pub currency: String,
    pub retailer: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_sar: Option<f64>,
    pub source_tool: String,
}

/// Partial update produced by enrichment or detail fetching. Only `Some`
/// fields are applied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferPatch {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub storage: Option<String>,
    pub condition: Option<Condition>,
}

impl Offer {
    pub fn new(
        name: impl Into<String>,
        price: f64,
        currency: impl Into<String>,
        retailer: impl Into<String>,
        link: impl Into<String>,
        source_tool: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            price,
            currency: currency.into(),
            retailer: retailer.into(),
            link: link.into(),
            condition: None,
            image: None,
            brand: None,
            model: None,
            storage: None,
            price_sar: None,
            source_tool: source_tool.into(),
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn has_link(&self) -> bool {
        !self.link.trim().is_empty()
    }

    /// Price used for filtering and ordering: the normalized home-currency
    /// price when known, otherwise the listed price. Non-finite values count
    /// as missing.
    pub fn effective_price(&self) -> Option<f64> {
        self.price_sar.or(Some(self.price)).filter(|value| value.is_finite())
    }

    pub fn condition_or_unknown(&self) -> Condition {
        self.condition.unwrap_or(Condition::Unknown)
    }

    pub fn lacks_detail(&self) -> bool {
        self.model.is_none() || self.storage.is_none()
    }

    /// Overwrites fields that the patch carries. An `Unknown` condition never
    /// replaces a known one.
    pub fn apply_patch(&mut self, patch: &OfferPatch) {
        if let Some(brand) = non_blank(&patch.brand) {
            self.brand = Some(brand);
        }
        if let Some(model) = non_blank(&patch.model) {
            self.model = Some(model);
        }
        if let Some(storage) = non_blank(&patch.storage) {
            self.storage = Some(storage);
        }
        match (patch.condition, self.condition) {
            (Some(Condition::Unknown), Some(_)) | (None, _) => {}
            (Some(condition), _) => self.condition = Some(condition),
        }
    }

    /// Fills fields this record is missing from a later record with the
    /// same link. Known values are kept.
    pub fn absorb(&mut self, later: Offer) {
        if self.condition.is_none() {
            self.condition = later.condition;
        }
        if self.image.is_none() {
            self.image = later.image;
        }
        if self.brand.is_none() {
            self.brand = later.brand;
        }
        if self.model.is_none() {
            self.model = later.model;
        }
        if self.storage.is_none() {
            self.storage = later.storage;
        }
        if self.price_sar.is_none() {
            self.price_sar = later.price_sar;
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

/// An offer chosen by the ranking step, with its justification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectedOffer {
    #[serde(flatten)]
    pub offer: Offer,
    pub reason: String,
}
