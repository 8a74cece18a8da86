use serde::{Deserialize, Serialize};

use crate::domain::offer::SelectedOffer;

/// One conversation turn. Frozen once a loop run starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub query: String,
    #[serde(default)]
    pub trusted_only: bool,
    /// Clarification questions already asked earlier in this conversation,
    /// as re-supplied by the caller.
    #[serde(default)]
    pub clarification_rounds: u8,
}

impl Request {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), trusted_only: false, clarification_rounds: 0 }
    }

    pub fn trusted_only(mut self, trusted_only: bool) -> Self {
        self.trusted_only = trusted_only;
        self
    }

    pub fn after_clarification(mut self) -> Self {
        self.clarification_rounds = self.clarification_rounds.saturating_add(1);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShoppingResult {
    pub items: Vec<SelectedOffer>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ShoppingResult {
    pub fn empty_with_note(note: impl Into<String>) -> Self {
        Self { items: Vec::new(), notes: Some(note.into()) }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
