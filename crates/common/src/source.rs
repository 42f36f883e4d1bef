use async_trait::async_trait;

use crate::Result;

/// Abstraction over the exchange's public ticker endpoint.
///
/// `OkxClient` in `crates/engine` implements this against the live API.
/// Any failure (timeout, bad status, malformed or empty payload) must come
/// back as `Error::Unavailable` so the fetcher can decide whether to fall
/// back to spot.
#[async_trait]
pub trait TickerSource: Send + Sync {
    /// Last traded price for an exchange instrument id (`BTC-USDT`,
    /// `BTC-USDT-SWAP`, ...), unrounded.
    async fn last_price(&self, inst_id: &str) -> Result<f64>;
}
