use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

/// Vetted local sellers used when no trust list is configured.
pub const DEFAULT_TRUSTED_RETAILERS: &[&str] = &[
    "Jarir",
    "Jarir Bookstore",
    "eXtra Stores",
    "Extra",
    "Noon.com",
    "noon",
    "Amazon.sa",
    "Amazon",
    "Apple Store",
    "Apple",
    "Aleph ألف",
    "Aleph",
    "Carrefour KSA",
    "جرير",
    "إكسترا",
    "اكسترا",
    "نون",
    "أمازون",
    "أبل",
    "ألف",
    "كارفور",
];

// Checked in order; more specific variants come first.
const RETAILER_ALIASES: &[(&str, &str)] = &[
    ("jarir bookstore", "Jarir"),
    ("jarir", "Jarir"),
    ("جرير", "Jarir"),
    ("extra", "eXtra Stores"),
    ("إكسترا", "eXtra Stores"),
    ("اكسترا", "eXtra Stores"),
    ("noon", "Noon.com"),
    ("نون", "Noon.com"),
    ("amazon.sa", "Amazon.sa"),
    ("amazon", "Amazon.sa"),
    ("أمازون", "Amazon.sa"),
    ("apple store", "Apple Store"),
    ("apple", "Apple Store"),
    ("أبل", "Apple Store"),
    ("aleph ألف", "Aleph ألف"),
    ("aleph", "Aleph ألف"),
    ("ألف", "Aleph ألف"),
    ("carrefour", "Carrefour KSA"),
    ("كارفور", "Carrefour KSA"),
];

// Aliases only match as whole words, so "Pineapple Phones" is not Apple.
fn alias_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        RETAILER_ALIASES
            .iter()
            .filter_map(|(alias, canonical)| {
                Regex::new(&format!(r"\b{}\b", regex::escape(alias)))
                    .ok()
                    .map(|pattern| (pattern, *canonical))
            })
            .collect()
    })
}

/// Maps seller name variants (English and Arabic) to one canonical name.
/// Unknown sellers are returned trimmed.
pub fn normalize_retailer(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let lowered = trimmed.to_lowercase();
    alias_patterns()
        .iter()
        .find(|(pattern, _)| pattern.is_match(&lowered))
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Case-insensitive retailer allow-list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustList {
    names: BTreeSet<String>,
}

impl TrustList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        Self { names }
    }

    pub fn contains(&self, retailer: &str) -> bool {
        self.names.contains(&retailer.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for TrustList {
    fn default() -> Self {
        Self::new(DEFAULT_TRUSTED_RETAILERS)
    }
}
