pub mod config;
pub mod domain;
pub mod errors;
pub mod retailers;

pub use domain::intent::{Intent, DEFAULT_FOLLOW_UP_QUESTION};
pub use domain::offer::{Condition, Offer, OfferPatch, SelectedOffer};
pub use domain::request::{Request, ShoppingResult};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use retailers::{normalize_retailer, TrustList};
