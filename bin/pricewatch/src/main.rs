use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use alerts::{AlertConfig, Evaluator};
use common::{AlertSink, Settings, TickerSource};
use engine::{Monitor, MonitorConfig, NoDerivativeSet, OkxClient, PriceFetcher};
use notify::NtfyNotifier;
use store::ConfigStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // ── Settings ─────────────────────────────────────────────────────────────
    let settings = Settings::from_env();
    info!(
        config = %settings.config_path,
        mode = %settings.market_mode,
        interval_ms = settings.poll_interval.as_millis() as u64,
        "PriceWatch starting"
    );

    // ── Persisted state ──────────────────────────────────────────────────────
    let store = ConfigStore::open(&settings.config_path, settings.default_ntfy.clone())
        .await
        .with_context(|| format!("Failed to open configuration {}", settings.config_path))?;
    let no_derivative = NoDerivativeSet::load(&settings.no_derivative_path)
        .await
        .with_context(|| {
            format!("Failed to load no-derivative list {}", settings.no_derivative_path)
        })?;

    // ── Collaborators ────────────────────────────────────────────────────────
    let source: Arc<dyn TickerSource> = Arc::new(OkxClient::new(&settings.okx_base_url));
    let fetcher = PriceFetcher::new(source, no_derivative).with_market_mode(settings.market_mode);

    let sink: Arc<dyn AlertSink> =
        Arc::new(NtfyNotifier::new(store.ntfy().await).with_cooldown(settings.notify_cooldown));

    let evaluator = Evaluator::new(AlertConfig {
        cooldown_secs: settings.alert_cooldown.as_secs(),
        ..AlertConfig::default()
    });

    let monitor_cfg = MonitorConfig {
        poll_interval: settings.poll_interval,
        fault_backoff: MonitorConfig::default()
            .fault_backoff
            .max(settings.poll_interval * 2),
    };
    let monitor = Monitor::new(monitor_cfg, Arc::new(store), fetcher, evaluator, sink);

    // ── Autostart ────────────────────────────────────────────────────────────
    if settings.autostart {
        if let Err(e) = monitor.start().await {
            warn!(error = %e, "Autostart skipped");
        }
    }

    // ── Control panel ────────────────────────────────────────────────────────
    let api_state = api::AppState::new(monitor.clone());
    let host = settings.host.clone();
    let port = settings.port;
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_state, &host, port).await {
            error!(error = %e, "Control panel API stopped");
        }
    });

    info!("All subsystems started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received. Stopping monitor.");
    monitor.stop().await;
    Ok(())
}
