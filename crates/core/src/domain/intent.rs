use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Structured reading of a shopping request.
///
/// `ready == false` always comes with a follow-up question and
/// `ready == true` never does; [`Intent::normalize`] restores that pairing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub need_summary: String,
    pub category: String,
    pub canonical_search_query: String,
    #[serde(default)]
    pub budget_min: Option<f64>,
    #[serde(default)]
    pub budget_max: Option<f64>,
    #[serde(default)]
    pub must_have: BTreeSet<String>,
    #[serde(default)]
    pub nice_to_have: BTreeSet<String>,
    #[serde(default)]
    pub missing_info: BTreeSet<String>,
    #[serde(default)]
    pub follow_up_question: Option<String>,
    pub ready: bool,
}

pub const DEFAULT_FOLLOW_UP_QUESTION: &str = "Could you share a bit more about what you need, such as your budget and any must-have features?";

impl Intent {
    /// Intent that can proceed straight to searching.
    pub fn ready_for(search_query: impl Into<String>) -> Self {
        let search_query = search_query.into();
        Self {
            need_summary: search_query.clone(),
            category: String::new(),
            canonical_search_query: search_query,
            budget_min: None,
            budget_max: None,
            must_have: BTreeSet::new(),
            nice_to_have: BTreeSet::new(),
            missing_info: BTreeSet::new(),
            follow_up_question: None,
            ready: true,
        }
    }

    /// Intent that needs the user to answer `question` first.
    pub fn needs_answer(search_query: impl Into<String>, question: impl Into<String>) -> Self {
        Self { follow_up_question: Some(question.into()), ready: false, ..Self::ready_for(search_query) }
    }

    /// Re-establishes the ready/follow-up pairing: blank questions are
    /// dropped, a ready intent carries no question, and an unready intent
    /// gets a question built from `missing_info` when none was supplied.
    pub fn normalize(mut self, raw_query: &str) -> Self {
        self.follow_up_question = self
            .follow_up_question
            .take()
            .map(|question| question.trim().to_string())
            .filter(|question| !question.is_empty());

        if self.canonical_search_query.trim().is_empty() {
            self.canonical_search_query = raw_query.trim().to_string();
        }

        if self.ready {
            self.follow_up_question = None;
        } else if self.follow_up_question.is_none() {
            self.follow_up_question = Some(self.synthesized_question());
        }

        self
    }

    /// Proceed with best effort: the caller has already spent its
    /// clarification round.
    pub fn force_ready(&mut self) {
        self.ready = true;
        self.follow_up_question = None;
    }

    fn synthesized_question(&self) -> String {
        if self.missing_info.is_empty() {
            return DEFAULT_FOLLOW_UP_QUESTION.to_string();
        }

        let missing = self.missing_info.iter().map(String::as_str).collect::<Vec<_>>();
        format!("Could you tell me more about: {}?", missing.join(", "))
    }
}
