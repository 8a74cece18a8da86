//! Concrete tool adapters backed by HTTP services and the LLM client.

pub mod enrich;
pub mod page_fetch;
pub mod price;
pub mod ranking;
pub mod search;

pub use enrich::LlmSpecEnricher;
pub use page_fetch::HttpDetailFetcher;
pub use price::StaticRatePriceNormalizer;
pub use ranking::LlmRankingOracle;
pub use search::SearchApiShopping;
