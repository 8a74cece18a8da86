use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::warn;

use crate::tools::{NormalizedPrice, PriceNormalizer, ToolError};

const UNKNOWN_CURRENCY_RATE: f64 = 1.0;

/// Converts into the home currency from a fixed rate table. Currencies
/// missing from the table convert at 1.0.
pub struct StaticRatePriceNormalizer {
    home_currency: String,
    rates: BTreeMap<String, f64>,
}

impl StaticRatePriceNormalizer {
    pub fn new(home_currency: impl Into<String>, rates: BTreeMap<String, f64>) -> Self {
        let rates = rates
            .into_iter()
            .map(|(code, rate)| (code.trim().to_ascii_uppercase(), rate))
            .collect();
        Self { home_currency: home_currency.into().trim().to_ascii_uppercase(), rates }
    }
}

#[async_trait]
impl PriceNormalizer for StaticRatePriceNormalizer {
    async fn normalize_price(
        &self,
        amount: f64,
        currency: Option<&str>,
    ) -> Result<NormalizedPrice, ToolError> {
        if !amount.is_finite() {
            return Err(ToolError::Unsupported(format!("price `{amount}` is not a number")));
        }

        let code = currency
            .map(|code| code.trim().to_ascii_uppercase())
            .filter(|code| !code.is_empty())
            .unwrap_or_else(|| self.home_currency.clone());

        if code == self.home_currency {
            return Ok(NormalizedPrice { price_sar: amount, currency: code });
        }

        let rate = match self.rates.get(&code) {
            Some(rate) => *rate,
            None => {
                warn!(
                    event_name = "agent.tool.price.unknown_currency",
                    currency = %code,
                    "no exchange rate configured, converting at 1.0"
                );
                UNKNOWN_CURRENCY_RATE
            }
        };
        Ok(NormalizedPrice { price_sar: amount * rate, currency: code })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::StaticRatePriceNormalizer;
    use crate::tools::{PriceNormalizer, ToolError};

    fn normalizer() -> StaticRatePriceNormalizer {
        StaticRatePriceNormalizer::new(
            "SAR",
            BTreeMap::from([("usd".to_string(), 3.75), ("EUR".to_string(), 4.1)]),
        )
    }

    #[tokio::test]
    async fn home_currency_and_missing_currency_pass_through() {
        let normalizer = normalizer();

        let home = normalizer.normalize_price(4599.0, Some("sar")).await.expect("sar converts");
        assert_eq!(home.price_sar, 4599.0);
        assert_eq!(home.currency, "SAR");

        let missing = normalizer.normalize_price(10.0, None).await.expect("assumes home");
        assert_eq!(missing.price_sar, 10.0);
        assert_eq!(missing.currency, "SAR");
    }

    #[tokio::test]
    async fn foreign_currency_uses_rate_table() {
        let converted =
            normalizer().normalize_price(100.0, Some("USD")).await.expect("usd converts");
        assert!((converted.price_sar - 375.0).abs() < f64::EPSILON);
        assert_eq!(converted.currency, "USD");
    }

    #[tokio::test]
    async fn unknown_currency_still_yields_a_price() {
        let converted =
            normalizer().normalize_price(100.0, Some("jpy")).await.expect("falls back to 1.0");
        assert_eq!(converted.price_sar, 100.0);
        assert_eq!(converted.currency, "JPY");
    }

    #[tokio::test]
    async fn non_finite_amount_is_rejected() {
        let error = normalizer().normalize_price(f64::NAN, Some("SAR")).await.expect_err("nan");
        assert!(matches!(error, ToolError::Unsupported(_)));
    }
}
