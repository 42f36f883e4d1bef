use async_trait::async_trait;

use crate::{Alert, MonitorState, NtfyConfig};

/// Where the monitor sends alerts.
///
/// `NtfyNotifier` in `crates/notify` is the production implementation. All
/// methods report delivery as a plain `bool`; failures are logged by the
/// implementation and never retried.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver an alert, subject to the sink's own cooldown.
    async fn send_alert(&self, alert: &Alert) -> bool;

    /// Deliver a test message, bypassing the cooldown.
    async fn send_test(&self) -> bool;

    /// Announce a monitor lifecycle change, bypassing the cooldown.
    async fn send_status(&self, state: MonitorState) -> bool;

    /// Swap the endpoint settings used for subsequent deliveries.
    async fn configure(&self, endpoint: NtfyConfig);

    /// Endpoint settings currently in use.
    async fn endpoint(&self) -> NtfyConfig;
}
