use std::time::Duration;

use async_trait::async_trait;
use concierge_core::config::SearchConfig;
use concierge_core::{normalize_retailer, Condition, Offer};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::tools::{SearchTool, ToolError};

pub const SEARCH_SOURCE: &str = "searchapi_google_shopping";

/// Google Shopping results through SearchAPI.io.
pub struct SearchApiShopping {
    http: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
    gl: String,
    hl: String,
    google_domain: String,
    location: String,
    default_currency: String,
}

impl SearchApiShopping {
    pub fn from_config(config: &SearchConfig, default_currency: &str) -> Result<Self, ToolError> {
        if config.api_key.expose_secret().trim().is_empty() {
            return Err(ToolError::Unsupported("search api key is not configured".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            endpoint: config.base_url.clone(),
            gl: config.gl.clone(),
            hl: config.hl.clone(),
            google_domain: config.google_domain.clone(),
            location: config.location.clone(),
            default_currency: default_currency.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    shopping_results: Option<Vec<Value>>,
}

#[async_trait]
impl SearchTool for SearchApiShopping {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Offer>, ToolError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("engine", "google_shopping"),
                ("q", query),
                ("gl", self.gl.as_str()),
                ("hl", self.hl.as_str()),
                ("google_domain", self.google_domain.as_str()),
                ("location", self.location.as_str()),
                ("api_key", self.api_key.expose_secret()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Status { status: status.as_u16(), body });
        }

        let payload: SearchResponse = response.json().await?;
        let results = payload.shopping_results.unwrap_or_default();
        let total = results.len();

        let offers = results
            .iter()
            .take(limit)
            .filter_map(|item| offer_from_result(item, &self.default_currency))
            .collect::<Vec<_>>();

        debug!(
            event_name = "agent.tool.search.results",
            total,
            kept = offers.len(),
            "search results converted"
        );
        Ok(offers)
    }
}

/// Skips results without a title, a price or a product link.
fn offer_from_result(item: &Value, default_currency: &str) -> Option<Offer> {
    let name = non_blank_str(item, "title")?;
    let price = item.get("extracted_price").and_then(Value::as_f64)?;
    let link = non_blank_str(item, "product_link")?;

    let retailer = normalize_retailer(item.get("seller").and_then(Value::as_str).unwrap_or(""));
    let currency = non_blank_str(item, "currency")
        .map(|code| code.to_ascii_uppercase())
        .unwrap_or_else(|| default_currency.to_string());

    let mut offer = Offer::new(name, price, currency, retailer, link, SEARCH_SOURCE);
    offer.condition = item.get("condition").and_then(Value::as_str).and_then(Condition::parse);
    offer.image = non_blank_str(item, "thumbnail").map(str::to_string);
    Some(offer)
}

fn non_blank_str<'a>(item: &'a Value, key: &str) -> Option<&'a str> {
    item.get(key).and_then(Value::as_str).map(str::trim).filter(|value| !value.is_empty())
}
