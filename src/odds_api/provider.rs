use anyhow::Result;
use async_trait::async_trait;

use crate::db::models::{Market, PropRow};

/// Trait that every prop-odds source must implement.
#[async_trait]
pub trait OddsProvider: Send + Sync {
    /// Every player-prop offer currently listed for the given markets.
    async fn fetch_player_props(&self, markets: &[Market]) -> Result<Vec<PropRow>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
