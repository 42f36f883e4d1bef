use alerts::{AlertConfig, Evaluator};
use chrono::{Duration, TimeZone, Utc};
use common::{Alert, Pair, Thresholds};
use proptest::prelude::*;

fn pair() -> Pair {
    Pair::parse("TEST/USDT").unwrap()
}

proptest! {
    /// With both bounds inactive no price sequence ever produces an alert.
    #[test]
    fn inactive_bounds_never_alert(
        prices in prop::collection::vec(0.0001f64..1_000_000.0f64, 1..50),
        step_secs in 1i64..1_000,
    ) {
        let mut ev = Evaluator::new(AlertConfig::default());
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let th = Thresholds::new(0.0, 0.0);
        for (i, price) in prices.into_iter().enumerate() {
            let now = start + Duration::seconds(step_secs * i as i64);
            prop_assert!(ev.evaluate(&pair(), price, &th, now).is_none());
        }
    }

    /// No two alerts for one pair are ever closer together than the cooldown.
    #[test]
    fn alerts_respect_cooldown(
        prices in prop::collection::vec(1.0f64..200.0f64, 1..80),
        step_secs in 1i64..120,
    ) {
        let config = AlertConfig::default();
        let cooldown = Duration::seconds(config.cooldown_secs as i64);
        let mut ev = Evaluator::new(config);
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let th = Thresholds::new(150.0, 50.0);

        let mut last = None;
        for (i, price) in prices.into_iter().enumerate() {
            let now = start + Duration::seconds(step_secs * i as i64);
            if ev.evaluate(&pair(), price, &th, now).is_some() {
                if let Some(prev) = last {
                    prop_assert!(now - prev >= cooldown);
                }
                last = Some(now);
            }
        }
    }

    /// Threshold alerts always report the breached bound and a price beyond it.
    #[test]
    fn threshold_alerts_are_consistent(price in 0.0001f64..1_000.0f64) {
        let mut ev = Evaluator::new(AlertConfig::default());
        let th = Thresholds::new(600.0, 300.0);
        match ev.evaluate(&pair(), price, &th, Utc::now()) {
            Some(Alert::AboveUpper { threshold, price: p, .. }) => {
                prop_assert_eq!(threshold, 600.0);
                prop_assert!(p > 600.0);
            }
            Some(Alert::BelowLower { threshold, price: p, .. }) => {
                prop_assert_eq!(threshold, 300.0);
                prop_assert!(p < 300.0);
            }
            Some(Alert::Swing { .. }) => prop_assert!(false, "no reference yet"),
            None => prop_assert!((300.0..=600.0).contains(&price)),
        }
    }
}
