use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConfigSection, Error};

/// Coin whose prices are kept at the higher rounding precision.
pub const ANCHOR_COIN: &str = "BTC";

/// A tradable asset quoted against another currency.
///
/// The canonical form is `BASE/QUOTE` (what users type and what the config
/// file stores). The exchange addresses the same instrument as `BASE-QUOTE`.
/// Parsing accepts either form, so normalizing twice is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pair {
    base: String,
    quote: String,
}

impl Pair {
    pub fn new(base: impl AsRef<str>, quote: impl AsRef<str>) -> Result<Self, Error> {
        let base = base.as_ref().trim().to_uppercase();
        let quote = quote.as_ref().trim().to_uppercase();
        let valid = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid(&base) || !valid(&quote) {
            return Err(Error::invalid(
                ConfigSection::Monitoring,
                format!("Invalid pair symbols: '{base}' / '{quote}'"),
            ));
        }
        Ok(Self { base, quote })
    }

    /// Parse `BTC/USDT` or `BTC-USDT` (case-insensitive, surrounding
    /// whitespace ignored).
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let raw = raw.trim();
        let (base, quote) = raw
            .split_once('/')
            .or_else(|| raw.split_once('-'))
            .ok_or_else(|| {
                Error::invalid(
                    ConfigSection::Monitoring,
                    format!("Pair '{raw}' must look like BASE/QUOTE"),
                )
            })?;
        Self::new(base, quote)
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Spot instrument id used by the exchange, e.g. `BTC-USDT`.
    pub fn inst_id(&self) -> String {
        format!("{}-{}", self.base, self.quote)
    }

    /// Perpetual swap instrument id, e.g. `BTC-USDT-SWAP`.
    pub fn swap_inst_id(&self) -> String {
        format!("{}-{}-SWAP", self.base, self.quote)
    }

    /// Decimal places kept for prices of this pair.
    pub fn price_precision(&self) -> u32 {
        if self.inst_id().contains(ANCHOR_COIN) {
            6
        } else {
            3
        }
    }
}

impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl std::str::FromStr for Pair {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pair::parse(s)
    }
}

impl TryFrom<String> for Pair {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Pair::parse(&value)
    }
}

impl From<Pair> for String {
    fn from(pair: Pair) -> Self {
        pair.to_string()
    }
}

/// Upper/lower alert bounds. A bound of `0` means that side is inactive.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Thresholds {
    pub upper: f64,
    pub lower: f64,
}

impl Thresholds {
    pub fn new(upper: f64, lower: f64) -> Self {
        Self { upper, lower }
    }

    pub fn upper_active(&self) -> bool {
        self.upper > 0.0
    }

    pub fn lower_active(&self) -> bool {
        self.lower > 0.0
    }

    /// True when neither side is active.
    pub fn is_inactive(&self) -> bool {
        !self.upper_active() && !self.lower_active()
    }

    /// Problems with these bounds, if any. Checked at every mutation boundary.
    pub fn issues(&self, pair: &Pair) -> Vec<String> {
        let mut issues = Vec::new();
        for (side, value) in [("upper", self.upper), ("lower", self.lower)] {
            if !value.is_finite() || value < 0.0 {
                issues.push(format!("{side} threshold for {pair} must be a non-negative number"));
            }
        }
        if issues.is_empty() && self.upper_active() && self.lower_active() && self.upper <= self.lower {
            issues.push(format!(
                "Invalid alert thresholds for {pair}: upper must be > lower"
            ));
        }
        issues
    }
}

/// One monitored pair as stored in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairConfig {
    pub pair: Pair,
    #[serde(default)]
    pub upper: f64,
    #[serde(default)]
    pub lower: f64,
}

impl PairConfig {
    pub fn new(pair: Pair, thresholds: Thresholds) -> Self {
        Self {
            pair,
            upper: thresholds.upper,
            lower: thresholds.lower,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds::new(self.upper, self.lower)
    }
}

/// Settings for the pub/sub notification endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NtfyConfig {
    pub server: String,
    pub topic: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
}

impl NtfyConfig {
    pub fn new(
        server: impl Into<String>,
        topic: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into().trim().trim_end_matches('/').to_string(),
            topic: topic.into().trim().to_string(),
            password: password.into().trim().to_string(),
        }
    }

    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.server.trim().is_empty() {
            issues.push("NTFY server is not configured".to_string());
        }
        if self.topic.trim().is_empty() {
            issues.push("NTFY topic is not configured".to_string());
        }
        issues
    }

    /// Full publish URL, `{server}/{topic}`.
    pub fn url(&self) -> String {
        format!("{}/{}", self.server.trim_end_matches('/'), self.topic)
    }
}

/// Which market the fetcher prices pairs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarketMode {
    #[default]
    Spot,
    Derivative,
}

impl MarketMode {
    pub fn toggled(self) -> Self {
        match self {
            MarketMode::Spot => MarketMode::Derivative,
            MarketMode::Derivative => MarketMode::Spot,
        }
    }
}

impl std::fmt::Display for MarketMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketMode::Spot => write!(f, "spot"),
            MarketMode::Derivative => write!(f, "derivative"),
        }
    }
}

/// Lifecycle state of the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    #[default]
    Stopped,
    Running,
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorState::Stopped => write!(f, "stopped"),
            MonitorState::Running => write!(f, "running"),
        }
    }
}

/// Direction of a percentage swing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
        }
    }
}

/// An alert decided by the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    AboveUpper {
        pair: Pair,
        price: f64,
        threshold: f64,
    },
    BelowLower {
        pair: Pair,
        price: f64,
        threshold: f64,
    },
    Swing {
        pair: Pair,
        price: f64,
        reference: f64,
        change_pct: f64,
        direction: Direction,
    },
}

impl Alert {
    pub fn pair(&self) -> &Pair {
        match self {
            Alert::AboveUpper { pair, .. }
            | Alert::BelowLower { pair, .. }
            | Alert::Swing { pair, .. } => pair,
        }
    }

    pub fn price(&self) -> f64 {
        match self {
            Alert::AboveUpper { price, .. }
            | Alert::BelowLower { price, .. }
            | Alert::Swing { price, .. } => *price,
        }
    }
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Alert::AboveUpper {
                price, threshold, ..
            } => write!(f, "Price {price:.2} is ABOVE upper threshold {threshold:.2}"),
            Alert::BelowLower {
                price, threshold, ..
            } => write!(f, "Price {price:.2} is BELOW lower threshold {threshold:.2}"),
            Alert::Swing {
                change_pct,
                direction,
                ..
            } => write!(f, "Price {direction} by {change_pct:.2}%"),
        }
    }
}

/// Aged reference price used to measure percentage swings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceSnapshot {
    pub price: f64,
    pub taken_at: DateTime<Utc>,
}

/// Per-pair alert bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AlertFlags {
    pub upper_fired: bool,
    pub lower_fired: bool,
    pub last_alert: Option<DateTime<Utc>>,
}

/// Alert flags and snapshot of one pair, as reported to the control surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairAlertStatus {
    pub pair: Pair,
    pub flags: AlertFlags,
    pub snapshot: Option<PriceSnapshot>,
}

/// Latest fetched price per configured pair; `None` when the fetch failed.
pub type PriceBoard = BTreeMap<Pair, Option<f64>>;

/// Summary returned by the monitoring status query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonitorStatus {
    pub state: MonitorState,
    pub market_mode: MarketMode,
    pub pair_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_parses_both_separators_to_same_value() {
        let slash = Pair::parse("btc/usdt").unwrap();
        let dash = Pair::parse(" BTC-USDT ").unwrap();
        assert_eq!(slash, dash);
        assert_eq!(slash.to_string(), "BTC/USDT");
        assert_eq!(slash.inst_id(), "BTC-USDT");
    }

    #[test]
    fn pair_normalization_is_idempotent() {
        let once = Pair::parse("eth/usdt").unwrap();
        let twice = Pair::parse(&once.to_string()).unwrap();
        let from_inst = Pair::parse(&once.inst_id()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once, from_inst);
    }

    #[test]
    fn pair_rejects_garbage() {
        assert!(Pair::parse("BTCUSDT").is_err());
        assert!(Pair::parse("/USDT").is_err());
        assert!(Pair::parse("BTC/").is_err());
        assert!(Pair::parse("BT C/USDT").is_err());
    }

    #[test]
    fn swap_inst_id_appends_suffix() {
        let pair = Pair::parse("ETH/USDT").unwrap();
        assert_eq!(pair.swap_inst_id(), "ETH-USDT-SWAP");
    }

    #[test]
    fn anchor_coin_gets_higher_precision() {
        assert_eq!(Pair::parse("BTC/USDT").unwrap().price_precision(), 6);
        assert_eq!(Pair::parse("ETH/BTC").unwrap().price_precision(), 6);
        assert_eq!(Pair::parse("ETH/USDT").unwrap().price_precision(), 3);
    }

    #[test]
    fn thresholds_reject_inverted_active_bounds() {
        let pair = Pair::parse("BTC/USDT").unwrap();
        assert!(Thresholds::new(100.0, 50.0).issues(&pair).is_empty());
        assert!(Thresholds::new(0.0, 50.0).issues(&pair).is_empty());
        assert!(Thresholds::new(0.0, 0.0).issues(&pair).is_empty());
        assert_eq!(Thresholds::new(50.0, 100.0).issues(&pair).len(), 1);
        assert_eq!(Thresholds::new(50.0, 50.0).issues(&pair).len(), 1);
        assert_eq!(Thresholds::new(-1.0, 0.0).issues(&pair).len(), 1);
        assert_eq!(Thresholds::new(f64::NAN, 0.0).issues(&pair).len(), 1);
    }

    #[test]
    fn alert_descriptions() {
        let pair = Pair::parse("BTC/USDT").unwrap();
        let up = Alert::Swing {
            pair: pair.clone(),
            price: 106.0,
            reference: 100.0,
            change_pct: 6.0,
            direction: Direction::Up,
        };
        assert_eq!(up.to_string(), "Price UP by 6.00%");

        let above = Alert::AboveUpper {
            pair,
            price: 101.0,
            threshold: 100.0,
        };
        assert_eq!(above.to_string(), "Price 101.00 is ABOVE upper threshold 100.00");
    }

    #[test]
    fn ntfy_url_strips_trailing_slash() {
        let cfg = NtfyConfig::new("https://ntfy.sh/", "alerts", "");
        assert_eq!(cfg.url(), "https://ntfy.sh/alerts");
        assert!(cfg.issues().is_empty());
        assert_eq!(NtfyConfig::new("", "", "").issues().len(), 2);
    }
}
