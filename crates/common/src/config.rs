use std::time::Duration;

use crate::{MarketMode, NtfyConfig};

/// Process settings loaded from environment variables at startup.
/// Every value has a default; a present but malformed value panics with a
/// clear message.
#[derive(Debug, Clone)]
pub struct Settings {
    // Persisted state
    pub config_path: String,
    pub no_derivative_path: String,

    // Control panel
    pub host: String,
    pub port: u16,

    // Exchange
    pub okx_base_url: String,
    pub market_mode: MarketMode,

    // Notification endpoint used when the config file has none yet
    pub default_ntfy: NtfyConfig,

    // Monitor loop
    pub poll_interval: Duration,
    pub alert_cooldown: Duration,
    pub notify_cooldown: Duration,
    pub autostart: bool,
}

impl Settings {
    /// Load all settings from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let market_mode = if parse_env("DERIVATIVE_MODE", false) {
            MarketMode::Derivative
        } else {
            MarketMode::Spot
        };

        Settings {
            config_path: optional_env("CONFIG_FILE")
                .unwrap_or_else(|| "config/monitor.toml".to_string()),
            no_derivative_path: optional_env("NO_DERIVATIVE_FILE")
                .unwrap_or_else(|| "no_derivative_coins.json".to_string()),
            host: optional_env("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_env("PORT", 5000),
            okx_base_url: optional_env("OKX_BASE_URL")
                .unwrap_or_else(|| "https://www.okx.com".to_string()),
            market_mode,
            default_ntfy: NtfyConfig::new(
                optional_env("NTFY_SERVER").unwrap_or_else(|| "https://ntfy.sh".to_string()),
                optional_env("NTFY_TOPIC").unwrap_or_else(|| "crypto_alerts".to_string()),
                optional_env("NTFY_PASSWORD").unwrap_or_default(),
            ),
            poll_interval: Duration::from_millis(parse_env("POLL_INTERVAL_MS", 2000)),
            alert_cooldown: Duration::from_secs(parse_env("ALERT_COOLDOWN_SECS", 300)),
            notify_cooldown: Duration::from_secs(parse_env("NOTIFY_COOLDOWN_SECS", 30)),
            autostart: parse_env("MONITOR_AUTOSTART", false),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw.trim().to_lowercase().parse().unwrap_or_else(|e| {
            panic!("Environment variable '{key}' has invalid value '{raw}': {e}")
        }),
        None => default,
    }
}
