pub mod client;
pub mod provider;

pub use client::OddsApiClient;
pub use provider::OddsProvider;
