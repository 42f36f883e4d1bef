use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{info, warn};

use common::{Alert, AlertSink, Error, MonitorState, NtfyConfig, Result};

use crate::message::{Notification, Priority};

/// Minimum gap between two alert deliveries, across all pairs.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes notifications to an ntfy-compatible pub/sub endpoint
/// (`POST {server}/{topic}` with the text as body).
///
/// Alerts pass through a process-wide cooldown that is independent of the
/// evaluator's per-pair cooldown, so a burst of pairs breaching together
/// produces one push, not one per pair. Test and status messages skip it.
pub struct NtfyNotifier {
    http: Client,
    endpoint: RwLock<NtfyConfig>,
    cooldown: Duration,
    /// Time of the last successful alert delivery. Held across the delivery
    /// so concurrent alerts cannot both slip through the gate.
    last_alert: Mutex<Option<Instant>>,
}

impl NtfyNotifier {
    pub fn new(endpoint: NtfyConfig) -> Self {
        Self {
            http: Client::new(),
            endpoint: RwLock::new(endpoint),
            cooldown: DEFAULT_COOLDOWN,
            last_alert: Mutex::new(None),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Post one notification, no cooldown. Any transport error or non-success
    /// status is a `DeliveryFailed`.
    pub async fn deliver(&self, notification: &Notification) -> Result<()> {
        let endpoint = self.endpoint.read().await.clone();
        let mut request = self
            .http
            .post(endpoint.url())
            .timeout(DELIVERY_TIMEOUT)
            .header("Title", &notification.title)
            .header("Priority", notification.priority.to_string())
            .header("Tags", &notification.tags)
            .body(notification.message.clone());
        if !endpoint.password.is_empty() {
            // ntfy reads an empty user name as "token/password only"
            request = request.basic_auth("", Some(&endpoint.password));
        }

        let resp = request
            .send()
            .await
            .map_err(|e| Error::DeliveryFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::DeliveryFailed(format!("HTTP {status}: {body}")));
        }
        Ok(())
    }

    /// Send a title/message pair as an alert, gated by the cooldown.
    /// Returns whether it was delivered.
    pub async fn send(&self, title: &str, message: &str) -> bool {
        let notification = Notification::new(title, message)
            .with_priority(Priority::High)
            .with_tags("warning,alert");
        self.send_gated(&notification).await
    }

    async fn send_gated(&self, notification: &Notification) -> bool {
        let mut last = self.last_alert.lock().await;
        if let Some(at) = *last {
            if at.elapsed() < self.cooldown {
                info!(title = %notification.title, "Alert sent recently, skipping due to cooldown");
                return false;
            }
        }

        let delivered = self.deliver_logged(notification).await;
        if delivered {
            *last = Some(Instant::now());
        }
        delivered
    }

    async fn deliver_logged(&self, notification: &Notification) -> bool {
        match self.deliver(notification).await {
            Ok(()) => {
                info!(title = %notification.title, "Notification sent");
                true
            }
            Err(e) => {
                warn!(title = %notification.title, error = %e, "Failed to send notification");
                false
            }
        }
    }
}

#[async_trait]
impl AlertSink for NtfyNotifier {
    async fn send_alert(&self, alert: &Alert) -> bool {
        self.send_gated(&Notification::for_alert(alert)).await
    }

    async fn send_test(&self) -> bool {
        let notification = Notification::test(chrono::Local::now());
        self.deliver_logged(&notification).await
    }

    async fn send_status(&self, state: MonitorState) -> bool {
        self.deliver_logged(&Notification::status(state)).await
    }

    async fn configure(&self, endpoint: NtfyConfig) {
        info!(url = %endpoint.url(), "NTFY endpoint reconfigured");
        *self.endpoint.write().await = endpoint;
    }

    async fn endpoint(&self) -> NtfyConfig {
        self.endpoint.read().await.clone()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use common::Pair;
    use mockito::Matcher;

    fn alert() -> Alert {
        Alert::AboveUpper {
            pair: Pair::parse("BTC/USDT").unwrap(),
            price: 101.0,
            threshold: 100.0,
        }
    }

    #[tokio::test]
    async fn alert_posts_headers_body_and_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/alerts")
            .match_header("title", "Price Alert - BTC/USDT")
            .match_header("priority", "high")
            .match_header("tags", "rocket,up,alert")
            .match_header("authorization", "Basic OnMzY3JldA==")
            .match_body("BTC/USDT: price $101.00 is above upper threshold $100.00")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let notifier = NtfyNotifier::new(NtfyConfig::new(server.url(), "alerts", "s3cret"));
        assert!(notifier.send_alert(&alert()).await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn cooldown_suppresses_second_alert() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/alerts")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let notifier = NtfyNotifier::new(NtfyConfig::new(server.url(), "alerts", ""));
        assert!(notifier.send_alert(&alert()).await);
        assert!(!notifier.send("Another", "burst").await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failed_delivery_does_not_start_cooldown() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", "/alerts")
            .with_status(500)
            .with_body("boom")
            .expect(2)
            .create_async()
            .await;

        let notifier = NtfyNotifier::new(NtfyConfig::new(server.url(), "alerts", ""));
        assert!(!notifier.send_alert(&alert()).await);
        assert!(!notifier.send_alert(&alert()).await);
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn deliver_maps_bad_status_to_delivery_failed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/alerts")
            .with_status(403)
            .create_async()
            .await;

        let notifier = NtfyNotifier::new(NtfyConfig::new(server.url(), "alerts", ""));
        let err = notifier
            .deliver(&Notification::new("t", "m"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeliveryFailed(ref msg) if msg.contains("403")));
    }

    #[tokio::test]
    async fn test_message_bypasses_cooldown_and_omits_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/alerts")
            .match_header("title", "Crypto Monitor Test")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .expect(2)
            .create_async()
            .await;

        let notifier = NtfyNotifier::new(NtfyConfig::new(server.url(), "alerts", ""));
        assert!(notifier.send_test().await);
        assert!(notifier.send_test().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn configure_switches_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/other-topic")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let notifier = NtfyNotifier::new(NtfyConfig::new("http://127.0.0.1:9", "alerts", ""));
        notifier
            .configure(NtfyConfig::new(server.url(), "other-topic", ""))
            .await;
        assert_eq!(notifier.endpoint().await.topic, "other-topic");
        assert!(notifier.send_status(MonitorState::Running).await);
        mock.assert_async().await;
    }
}
