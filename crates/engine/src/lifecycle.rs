use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tracing::{error, info, warn};

use alerts::Evaluator;
use common::{
    Alert, AlertSink, Error, MarketMode, MonitorState, MonitorStatus, NtfyConfig, Pair,
    PairAlertStatus, PairConfig, PriceBoard, Result, Thresholds,
};
use store::ConfigStore;

use crate::PriceFetcher;

/// Loop timing.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Pause between two completed cycles.
    pub poll_interval: Duration,
    /// Pause after a cycle that faulted. Longer than `poll_interval`.
    pub fault_backoff: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            fault_backoff: Duration::from_secs(5),
        }
    }
}

struct Shared {
    config: MonitorConfig,
    store: Arc<ConfigStore>,
    fetcher: PriceFetcher,
    evaluator: Mutex<Evaluator>,
    sink: Arc<dyn AlertSink>,
    prices: RwLock<PriceBoard>,
    state: RwLock<MonitorState>,
    /// Present while the loop runs. Taking it out is what stops the loop.
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    board_tx: broadcast::Sender<PriceBoard>,
}

/// Cloneable handle to the monitoring loop and everything the control
/// surface reads or mutates.
///
/// The loop is a single background task. Each cycle copies the pair list,
/// fetches all prices, publishes the board, evaluates every priced pair and
/// hands alerts to the sink. Configuration edits made mid-cycle take effect
/// on the next one.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Shared>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        store: Arc<ConfigStore>,
        fetcher: PriceFetcher,
        evaluator: Evaluator,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        let (board_tx, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Shared {
                config,
                store,
                fetcher,
                evaluator: Mutex::new(evaluator),
                sink,
                prices: RwLock::new(PriceBoard::new()),
                state: RwLock::new(MonitorState::Stopped),
                stop_tx: Mutex::new(None),
                board_tx,
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Start the loop. Fails with `AlreadyRunning` if it is running and with
    /// `ConfigInvalid` while the configuration has issues.
    pub async fn start(&self) -> Result<()> {
        {
            let mut stop_slot = self.inner.stop_tx.lock().await;
            if stop_slot.is_some() {
                return Err(Error::AlreadyRunning);
            }
            let issues = self.inner.store.validate().await;
            if !issues.is_empty() {
                return Err(Error::ConfigInvalid(issues));
            }

            let (stop_tx, stop_rx) = watch::channel(false);
            *stop_slot = Some(stop_tx);
            *self.inner.state.write().await = MonitorState::Running;
            tokio::spawn(run_loop(self.inner.clone(), stop_rx));
        }

        let pairs = self.inner.store.pairs().await.len();
        let mode = self.inner.fetcher.market_mode().await;
        info!(pairs, %mode, "Monitoring started");
        self.inner.sink.send_status(MonitorState::Running).await;
        Ok(())
    }

    /// Stop the loop. Idempotent; returns whether it was running. A cycle
    /// already in flight finishes, no further cycle begins.
    pub async fn stop(&self) -> bool {
        let Some(stop_tx) = self.inner.stop_tx.lock().await.take() else {
            return false;
        };
        let _ = stop_tx.send(true);
        *self.inner.state.write().await = MonitorState::Stopped;
        info!("Monitoring stopped");
        self.inner.sink.send_status(MonitorState::Stopped).await;
        true
    }

    pub async fn state(&self) -> MonitorState {
        *self.inner.state.read().await
    }

    pub async fn status(&self) -> MonitorStatus {
        MonitorStatus {
            state: self.state().await,
            market_mode: self.inner.fetcher.market_mode().await,
            pair_count: self.inner.store.pairs().await.len(),
        }
    }

    /// Run one cycle now, outside the loop. Returns the alerts raised, as
    /// `"{pair}: {description}"` lines.
    pub async fn run_cycle(&self) -> Vec<String> {
        self.inner.run_cycle().await
    }

    // ── Prices ───────────────────────────────────────────────────────────────

    /// Latest price of every configured pair; `None` for pairs without a
    /// price from the last cycle.
    pub async fn prices(&self) -> PriceBoard {
        let pairs = self.inner.store.pairs().await;
        let board = self.inner.prices.read().await;
        pairs
            .into_iter()
            .map(|c| {
                let price = board.get(&c.pair).copied().flatten();
                (c.pair, price)
            })
            .collect()
    }

    /// Receive the board after every completed cycle.
    pub fn subscribe_prices(&self) -> broadcast::Receiver<PriceBoard> {
        self.inner.board_tx.subscribe()
    }

    pub async fn market_mode(&self) -> MarketMode {
        self.inner.fetcher.market_mode().await
    }

    pub async fn set_market_mode(&self, mode: MarketMode) {
        self.inner.fetcher.set_market_mode(mode).await;
    }

    pub async fn toggle_market_mode(&self) -> MarketMode {
        self.inner.fetcher.toggle_market_mode().await
    }

    pub async fn no_derivative_coins(&self) -> Vec<String> {
        self.inner.fetcher.no_derivative_coins().await
    }

    // ── Pairs ────────────────────────────────────────────────────────────────

    pub async fn pairs(&self) -> Vec<PairConfig> {
        self.inner.store.pairs().await
    }

    /// Add or replace a pair. Replacing starts it over: flags, last alert
    /// time and swing reference are all dropped.
    pub async fn add_pair(&self, pair: Pair, thresholds: Thresholds) -> Result<()> {
        self.inner.store.add_pair(pair.clone(), thresholds).await?;
        self.inner.evaluator.lock().await.forget(&pair);
        Ok(())
    }

    /// Change an existing pair's thresholds and clear its alert flags. The
    /// swing reference is kept.
    pub async fn update_pair(&self, pair: &Pair, thresholds: Thresholds) -> Result<()> {
        self.inner.store.update_pair(pair, thresholds).await?;
        self.inner.evaluator.lock().await.reset(Some(pair));
        Ok(())
    }

    /// Remove a pair together with its alert state and last price.
    pub async fn delete_pair(&self, pair: &Pair) -> Result<()> {
        self.inner.store.delete_pair(pair).await?;
        self.inner.evaluator.lock().await.forget(pair);
        self.inner.prices.write().await.remove(pair);
        Ok(())
    }

    // ── Alerts ───────────────────────────────────────────────────────────────

    /// Clear alert flags for one configured pair, or for all pairs.
    pub async fn reset_alerts(&self, pair: Option<&Pair>) -> Result<()> {
        if let Some(pair) = pair {
            self.ensure_configured(pair).await?;
        }
        self.inner.evaluator.lock().await.reset(pair);
        match pair {
            Some(pair) => info!(pair = %pair, "Alert state reset"),
            None => info!("Alert state reset for all pairs"),
        }
        Ok(())
    }

    /// Alert state of one configured pair, or of every configured pair in
    /// configuration order.
    pub async fn alert_status(&self, pair: Option<&Pair>) -> Result<Vec<PairAlertStatus>> {
        let pairs: Vec<Pair> = match pair {
            Some(pair) => {
                self.ensure_configured(pair).await?;
                vec![pair.clone()]
            }
            None => self.inner.store.pairs().await.into_iter().map(|c| c.pair).collect(),
        };
        let evaluator = self.inner.evaluator.lock().await;
        Ok(pairs.iter().map(|p| evaluator.status(p)).collect())
    }

    // ── Notifications ────────────────────────────────────────────────────────

    pub async fn ntfy_config(&self) -> NtfyConfig {
        self.inner.store.ntfy().await
    }

    /// Persist new endpoint settings and point the sink at them.
    pub async fn set_ntfy_config(&self, ntfy: NtfyConfig) -> Result<()> {
        self.inner.store.set_ntfy(ntfy.clone()).await?;
        self.inner.sink.configure(ntfy).await;
        Ok(())
    }

    /// Send a test message, optionally switching to `ntfy` first.
    pub async fn send_test_notification(&self, ntfy: Option<NtfyConfig>) -> Result<()> {
        if let Some(ntfy) = ntfy {
            self.set_ntfy_config(ntfy).await?;
        }
        if self.inner.sink.send_test().await {
            Ok(())
        } else {
            let url = self.inner.sink.endpoint().await.url();
            Err(Error::DeliveryFailed(format!("test notification to {url} was not delivered")))
        }
    }

    async fn ensure_configured(&self, pair: &Pair) -> Result<()> {
        match self.inner.store.thresholds(pair).await {
            Some(_) => Ok(()),
            None => Err(Error::PairNotFound(pair.to_string())),
        }
    }
}

impl Shared {
    async fn run_cycle(&self) -> Vec<String> {
        let configs = self.store.pairs().await;
        let pairs: Vec<Pair> = configs.iter().map(|c| c.pair.clone()).collect();
        let board = self.fetcher.fetch_all(&pairs).await;

        *self.prices.write().await = board.clone();
        // No subscribers is fine
        let _ = self.board_tx.send(board.clone());

        let now = Utc::now();
        let alerts: Vec<Alert> = {
            let mut evaluator = self.evaluator.lock().await;
            configs
                .iter()
                .filter_map(|c| {
                    let price = board.get(&c.pair).copied().flatten()?;
                    evaluator.evaluate(&c.pair, price, &c.thresholds(), now)
                })
                .collect()
        };

        let mut raised = Vec::with_capacity(alerts.len());
        for alert in alerts {
            warn!(pair = %alert.pair(), price = alert.price(), %alert, "Alert triggered");
            self.sink.send_alert(&alert).await;
            raised.push(format!("{}: {alert}", alert.pair()));
        }
        raised
    }
}

async fn run_loop(shared: Arc<Shared>, mut stop_rx: watch::Receiver<bool>) {
    info!(interval_ms = shared.config.poll_interval.as_millis() as u64, "Monitoring loop running");

    loop {
        if *stop_rx.borrow() {
            break;
        }

        // A panicking cycle surfaces as a JoinError and must not end the loop
        let cycle = tokio::spawn({
            let shared = shared.clone();
            async move { shared.run_cycle().await }
        });
        let pause = match cycle.await {
            Ok(_) => shared.config.poll_interval,
            Err(e) => {
                let fault = Error::LoopFault(e.to_string());
                error!(error = %fault, backoff_ms = shared.config.fault_backoff.as_millis() as u64, "Backing off");
                shared.config.fault_backoff
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("Monitoring loop exited");
}

// ─── Tests ────────────────────────────────────────────────────────────────────
