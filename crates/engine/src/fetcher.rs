use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use common::{MarketMode, Pair, PriceBoard, Result, TickerSource};

use crate::{NoDerivativeSet, PriceCache};

/// Minimum gap between two upstream requests, process-wide.
pub const REQUEST_SPACING: Duration = Duration::from_millis(100);

/// Process-wide request spacing. Callers queue on the lock, so requests go
/// out one at a time at least `spacing` apart.
struct RateLimiter {
    spacing: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.spacing;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Market mode plus a counter bumped on every mode change. A fetch only
/// caches its result if the generation it started under is still current.
#[derive(Debug, Clone, Copy)]
struct ModeState {
    mode: MarketMode,
    generation: u64,
}

/// Looks up one price per pair against the exchange.
///
/// Order of operations: cache (keyed by spot id) → market selection →
/// rate limit → request. In derivative mode a failed swap lookup marks the
/// coin as spot-only and the same pair is retried once against spot, so the
/// caller never sees the failed derivative attempt.
pub struct PriceFetcher {
    source: Arc<dyn TickerSource>,
    cache: Mutex<PriceCache>,
    limiter: RateLimiter,
    mode: RwLock<ModeState>,
    no_derivative: NoDerivativeSet,
}

impl PriceFetcher {
    pub fn new(source: Arc<dyn TickerSource>, no_derivative: NoDerivativeSet) -> Self {
        Self {
            source,
            cache: Mutex::new(PriceCache::default()),
            limiter: RateLimiter::new(REQUEST_SPACING),
            mode: RwLock::new(ModeState {
                mode: MarketMode::Spot,
                generation: 0,
            }),
            no_derivative,
        }
    }

    pub fn with_request_spacing(mut self, spacing: Duration) -> Self {
        self.limiter = RateLimiter::new(spacing);
        self
    }

    pub fn with_market_mode(mut self, mode: MarketMode) -> Self {
        self.mode = RwLock::new(ModeState {
            mode,
            generation: 0,
        });
        self
    }

    /// Current price of `pair`, or `None` when it could not be fetched.
    pub async fn fetch_price(&self, pair: &Pair) -> Option<f64> {
        let spot_id = pair.inst_id();
        if let Some(price) = self.cache.lock().await.get(&spot_id) {
            return Some(price);
        }

        let started = *self.mode.read().await;
        let use_derivative =
            started.mode == MarketMode::Derivative && !self.no_derivative.contains(pair.base()).await;

        let result = if use_derivative {
            let swap_id = pair.swap_inst_id();
            match self.request(&swap_id).await {
                Ok(price) => Ok(price),
                Err(e) => {
                    warn!(%swap_id, error = %e, "Derivative lookup failed, falling back to spot");
                    self.no_derivative.insert(pair.base()).await;
                    self.request(&spot_id).await
                }
            }
        } else {
            self.request(&spot_id).await
        };

        match result {
            Ok(raw) => {
                let price = round_to(raw, pair.price_precision());
                // Checked under the cache lock: a mode change bumps the
                // generation before it clears, so a stale put cannot survive
                let mut cache = self.cache.lock().await;
                if self.mode.read().await.generation == started.generation {
                    cache.put(spot_id, price);
                } else {
                    debug!(pair = %pair, "Market mode changed mid-fetch, not caching");
                }
                Some(price)
            }
            Err(e) => {
                warn!(pair = %pair, error = %e, "Price unavailable");
                None
            }
        }
    }

    /// Fetch every pair in order. Failed lookups are `None` on the board.
    pub async fn fetch_all(&self, pairs: &[Pair]) -> PriceBoard {
        let mut board = PriceBoard::new();
        for pair in pairs {
            let price = self.fetch_price(pair).await;
            debug!(pair = %pair, ?price, "Fetched price");
            board.insert(pair.clone(), price);
        }
        board
    }

    pub async fn market_mode(&self) -> MarketMode {
        self.mode.read().await.mode
    }

    /// Switch market mode. Always empties the cache.
    pub async fn set_market_mode(&self, mode: MarketMode) {
        self.switch_mode(|_| mode).await;
        info!(%mode, "Market mode set");
    }

    /// Flip between spot and derivative, returning the new mode.
    pub async fn toggle_market_mode(&self) -> MarketMode {
        let mode = self.switch_mode(MarketMode::toggled).await;
        info!(%mode, "Market mode toggled");
        mode
    }

    async fn switch_mode(&self, next: impl FnOnce(MarketMode) -> MarketMode) -> MarketMode {
        let mode = {
            let mut state = self.mode.write().await;
            state.mode = next(state.mode);
            state.generation += 1;
            state.mode
        };
        self.cache.lock().await.clear();
        mode
    }

    pub async fn no_derivative_coins(&self) -> Vec<String> {
        self.no_derivative.list().await
    }

    async fn request(&self, inst_id: &str) -> Result<f64> {
        self.limiter.wait().await;
        self.source.last_price(inst_id).await
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::Error;
    use std::collections::HashMap;

    /// Ticker source answering from a fixed table and recording every call.
    #[derive(Default)]
    pub(crate) struct ScriptedSource {
        prices: std::sync::Mutex<HashMap<String, f64>>,
        calls: std::sync::Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        pub(crate) fn with(prices: &[(&str, f64)]) -> Arc<Self> {
            let source = Self::default();
            source.set_all(prices);
            Arc::new(source)
        }

        pub(crate) fn set_all(&self, prices: &[(&str, f64)]) {
            let mut table = self.prices.lock().unwrap();
            for (id, price) in prices {
                table.insert(id.to_string(), *price);
            }
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TickerSource for ScriptedSource {
        async fn last_price(&self, inst_id: &str) -> Result<f64> {
            self.calls.lock().unwrap().push(inst_id.to_string());
            self.prices
                .lock()
                .unwrap()
                .get(inst_id)
                .copied()
                .ok_or_else(|| Error::Unavailable(format!("{inst_id}: no such instrument")))
        }
    }

    fn fetcher(source: Arc<ScriptedSource>) -> PriceFetcher {
        PriceFetcher::new(source, NoDerivativeSet::in_memory()).with_request_spacing(Duration::ZERO)
    }

    fn pair(raw: &str) -> Pair {
        Pair::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn rounds_by_coin_class() {
        let source = ScriptedSource::with(&[
            ("BTC-USDT", 64_000.123_456_7),
            ("ETH-USDT", 3_120.123_45),
        ]);
        let f = fetcher(source);
        assert_eq!(f.fetch_price(&pair("BTC/USDT")).await, Some(64_000.123_457));
        assert_eq!(f.fetch_price(&pair("ETH/USDT")).await, Some(3_120.123));
    }

    #[tokio::test]
    async fn cache_hit_skips_upstream() {
        let source = ScriptedSource::with(&[("ETH-USDT", 3_000.0)]);
        let f = fetcher(source.clone());
        assert_eq!(f.fetch_price(&pair("ETH/USDT")).await, Some(3_000.0));
        assert_eq!(f.fetch_price(&pair("ETH/USDT")).await, Some(3_000.0));
        assert_eq!(source.calls(), vec!["ETH-USDT"]);
    }

    #[tokio::test]
    async fn derivative_mode_queries_swap_market() {
        let source = ScriptedSource::with(&[("ETH-USDT-SWAP", 3_001.0), ("ETH-USDT", 3_000.0)]);
        let f = fetcher(source.clone()).with_market_mode(MarketMode::Derivative);
        assert_eq!(f.fetch_price(&pair("ETH/USDT")).await, Some(3_001.0));
        assert_eq!(source.calls(), vec!["ETH-USDT-SWAP"]);
    }

    #[tokio::test]
    async fn failed_derivative_lookup_falls_back_to_spot_and_records_coin() {
        let source = ScriptedSource::with(&[("PEPE-USDT", 1.234_4)]);
        let f = fetcher(source.clone()).with_market_mode(MarketMode::Derivative);

        assert_eq!(f.fetch_price(&pair("PEPE/USDT")).await, Some(1.234));
        assert_eq!(source.calls(), vec!["PEPE-USDT-SWAP", "PEPE-USDT"]);
        assert_eq!(f.no_derivative_coins().await, vec!["PEPE".to_string()]);

        // Known spot-only coins go straight to spot
        f.set_market_mode(MarketMode::Derivative).await;
        f.fetch_price(&pair("PEPE/USDT")).await;
        assert_eq!(
            source.calls(),
            vec!["PEPE-USDT-SWAP", "PEPE-USDT", "PEPE-USDT"]
        );
    }

    #[tokio::test]
    async fn unavailable_everywhere_is_none_and_not_cached() {
        let source = ScriptedSource::with(&[]);
        let f = fetcher(source.clone()).with_market_mode(MarketMode::Derivative);
        assert_eq!(f.fetch_price(&pair("ABC/USDT")).await, None);
        assert_eq!(f.fetch_price(&pair("ABC/USDT")).await, None);
        assert_eq!(
            source.calls(),
            vec!["ABC-USDT-SWAP", "ABC-USDT", "ABC-USDT"]
        );
    }

    #[tokio::test]
    async fn mode_switch_clears_cache() {
        let source = ScriptedSource::with(&[("ETH-USDT", 3_000.0), ("ETH-USDT-SWAP", 3_005.0)]);
        let f = fetcher(source.clone());
        assert_eq!(f.fetch_price(&pair("ETH/USDT")).await, Some(3_000.0));

        assert_eq!(f.toggle_market_mode().await, MarketMode::Derivative);
        assert_eq!(f.fetch_price(&pair("ETH/USDT")).await, Some(3_005.0));
        assert_eq!(f.market_mode().await, MarketMode::Derivative);
    }

    /// Answers from a `ScriptedSource` after a fixed delay.
    struct SlowSource {
        inner: Arc<ScriptedSource>,
        delay: Duration,
    }

    #[async_trait]
    impl TickerSource for SlowSource {
        async fn last_price(&self, inst_id: &str) -> Result<f64> {
            tokio::time::sleep(self.delay).await;
            self.inner.last_price(inst_id).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn price_in_flight_across_mode_switch_is_not_cached() {
        let table = ScriptedSource::with(&[("ETH-USDT", 3_000.0), ("ETH-USDT-SWAP", 3_005.0)]);
        let source = Arc::new(SlowSource {
            inner: table.clone(),
            delay: Duration::from_millis(100),
        });
        let f = Arc::new(
            PriceFetcher::new(source, NoDerivativeSet::in_memory())
                .with_request_spacing(Duration::ZERO),
        );

        let in_flight = tokio::spawn({
            let f = f.clone();
            async move { f.fetch_price(&pair("ETH/USDT")).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.toggle_market_mode().await, MarketMode::Derivative);

        // The caller that asked in spot mode still gets its answer
        assert_eq!(in_flight.await.unwrap(), Some(3_000.0));
        // but the next lookup goes to the derivative market
        assert_eq!(f.fetch_price(&pair("ETH/USDT")).await, Some(3_005.0));
        assert_eq!(table.calls(), vec!["ETH-USDT", "ETH-USDT-SWAP"]);
    }

    #[tokio::test]
    async fn fetch_all_keeps_failures_on_the_board() {
        let source = ScriptedSource::with(&[("BTC-USDT", 50_000.0)]);
        let f = fetcher(source);
        let board = f.fetch_all(&[pair("BTC/USDT"), pair("NOPE/USDT")]).await;
        assert_eq!(board.get(&pair("BTC/USDT")), Some(&Some(50_000.0)));
        assert_eq!(board.get(&pair("NOPE/USDT")), Some(&None));
    }

    #[tokio::test(start_paused = true)]
    async fn requests_are_spaced() {
        let limiter = RateLimiter::new(REQUEST_SPACING);
        let start = Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() < REQUEST_SPACING);
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= REQUEST_SPACING * 2);
    }
}
