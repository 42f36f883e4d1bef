use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use common::{Alert, AlertFlags, Direction, Pair, PairAlertStatus, PriceSnapshot, Thresholds};

/// Tunable alerting parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Minimum seconds between two alerts of any kind for the same pair.
    /// Also the time a pair must stay back inside a bound before that bound
    /// re-arms.
    pub cooldown_secs: u64,
    /// How often the swing reference price is refreshed.
    pub snapshot_interval_secs: u64,
    /// Swing size (percent) that triggers a percentage alert. Strictly greater
    /// than this fires.
    pub swing_pct: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 300,
            snapshot_interval_secs: 300,
            swing_pct: 5.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct PairTracker {
    flags: AlertFlags,
    snapshot: Option<PriceSnapshot>,
}

/// Decides, per pair, whether a price crosses a threshold or swings far
/// enough from its aged reference to alert, and suppresses repeats.
///
/// Each bound is a two-state machine: armed (`*_fired == false`) or fired.
/// A breach fires only while armed and outside the pair's cooldown; a fired
/// bound re-arms once the price is back inside it and the cooldown since the
/// last alert has passed. Swing alerts carry no flag of their own and are
/// gated only by the shared cooldown.
pub struct Evaluator {
    config: AlertConfig,
    trackers: HashMap<Pair, PairTracker>,
}

impl Evaluator {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            trackers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Evaluate one observed price. Returns the alert to deliver, if any, and
    /// updates the pair's flags and snapshot in place.
    pub fn evaluate(
        &mut self,
        pair: &Pair,
        price: f64,
        thresholds: &Thresholds,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        if thresholds.is_inactive() || !price.is_finite() {
            return None;
        }

        let cooldown = Duration::seconds(self.config.cooldown_secs as i64);
        let snapshot_interval = Duration::seconds(self.config.snapshot_interval_secs as i64);
        let swing_pct = self.config.swing_pct;

        let tracker = self.trackers.entry(pair.clone()).or_default();
        let can_alert = tracker
            .flags
            .last_alert
            .map_or(true, |last| now.signed_duration_since(last) >= cooldown);

        // Absolute bounds, upper first
        if thresholds.upper_active()
            && price > thresholds.upper
            && !tracker.flags.upper_fired
            && can_alert
        {
            warn!(pair = %pair, price, upper = thresholds.upper, "Price above upper threshold");
            tracker.flags.upper_fired = true;
            tracker.flags.last_alert = Some(now);
            return Some(Alert::AboveUpper {
                pair: pair.clone(),
                price,
                threshold: thresholds.upper,
            });
        } else if thresholds.lower_active()
            && price < thresholds.lower
            && !tracker.flags.lower_fired
            && can_alert
        {
            warn!(pair = %pair, price, lower = thresholds.lower, "Price below lower threshold");
            tracker.flags.lower_fired = true;
            tracker.flags.last_alert = Some(now);
            return Some(Alert::BelowLower {
                pair: pair.clone(),
                price,
                threshold: thresholds.lower,
            });
        }

        // Re-arm bounds the price has come back inside of
        if can_alert {
            if thresholds.upper_active() && price <= thresholds.upper && tracker.flags.upper_fired {
                debug!(pair = %pair, "Upper threshold re-armed");
                tracker.flags.upper_fired = false;
            }
            if thresholds.lower_active() && price >= thresholds.lower && tracker.flags.lower_fired {
                debug!(pair = %pair, "Lower threshold re-armed");
                tracker.flags.lower_fired = false;
            }
        }

        // Swing against the aged reference
        if let Some(snapshot) = tracker.snapshot {
            if snapshot.price > 0.0 && can_alert {
                let change_pct = ((price - snapshot.price) / snapshot.price).abs() * 100.0;
                if change_pct > swing_pct {
                    let direction = if price > snapshot.price {
                        Direction::Up
                    } else {
                        Direction::Down
                    };
                    warn!(
                        pair = %pair,
                        price,
                        reference = snapshot.price,
                        change_pct,
                        direction = %direction,
                        "Price swing alert"
                    );
                    tracker.flags.last_alert = Some(now);
                    return Some(Alert::Swing {
                        pair: pair.clone(),
                        price,
                        reference: snapshot.price,
                        change_pct,
                        direction,
                    });
                }
            }
        }

        // Refresh the reference at most once per interval
        let stale = tracker
            .snapshot
            .map_or(true, |s| now.signed_duration_since(s.taken_at) >= snapshot_interval);
        if stale {
            tracker.snapshot = Some(PriceSnapshot {
                price,
                taken_at: now,
            });
        }

        None
    }

    /// Clear flags and last-alert time for one pair, or for every tracked
    /// pair when `pair` is `None`. Snapshots are kept.
    pub fn reset(&mut self, pair: Option<&Pair>) {
        match pair {
            Some(pair) => {
                if let Some(tracker) = self.trackers.get_mut(pair) {
                    tracker.flags = AlertFlags::default();
                }
            }
            None => {
                for tracker in self.trackers.values_mut() {
                    tracker.flags = AlertFlags::default();
                }
            }
        }
    }

    /// Drop all state for a pair (flags and snapshot).
    pub fn forget(&mut self, pair: &Pair) {
        self.trackers.remove(pair);
    }

    /// Current state of one pair; defaults when the pair was never evaluated.
    pub fn status(&self, pair: &Pair) -> PairAlertStatus {
        let tracker = self.trackers.get(pair).cloned().unwrap_or_default();
        PairAlertStatus {
            pair: pair.clone(),
            flags: tracker.flags,
            snapshot: tracker.snapshot,
        }
    }

    /// State of every tracked pair, sorted by pair.
    pub fn statuses(&self) -> Vec<PairAlertStatus> {
        let mut pairs: Vec<&Pair> = self.trackers.keys().collect();
        pairs.sort();
        pairs.into_iter().map(|p| self.status(p)).collect()
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
