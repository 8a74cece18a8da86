pub mod intent;
pub mod offer;
pub mod request;
