use axum::{
    body::Bytes,
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use common::{ConfigSection, Error, MarketMode, MonitorState, NtfyConfig, Pair, Thresholds};

use crate::{ApiError, ApiResult, AppState};

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/prices", get(get_prices))
        .route("/api/monitoring/start", post(start_monitoring))
        .route("/api/monitoring/stop", post(stop_monitoring))
        .route("/api/monitoring/status", get(monitoring_status))
        .route("/api/market_mode/toggle", post(toggle_market_mode))
        .route(
            "/api/pairs",
            get(list_pairs)
                .post(add_pair)
                .put(update_pair)
                .delete(delete_pair),
        )
        .route("/api/ntfy_config", get(get_ntfy_config).post(set_ntfy_config))
        .route("/api/test_ntfy", post(test_ntfy))
        .route("/api/reset_alerts", post(reset_alerts))
        .route("/api/alert_status", get(alert_status))
        .route("/api/no_derivative_coins", get(no_derivative_coins))
}

/// Body that may be omitted entirely. Blank means absent; anything else
/// must parse or the request is rejected with the given section.
fn optional_body<T: DeserializeOwned>(
    bytes: &Bytes,
    section: ConfigSection,
) -> Result<Option<T>, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|e| Error::invalid(section, format!("Malformed request body: {e}")).into())
}

// ─── Prices ───────────────────────────────────────────────────────────────────

async fn get_prices(State(state): State<AppState>) -> Json<Value> {
    let prices = state.monitor.prices().await;
    Json(json!({
        "status": "success",
        "prices": prices,
        "market_mode": state.monitor.market_mode().await,
        "timestamp": chrono::Local::now().format("%H:%M:%S").to_string(),
    }))
}

// ─── Monitoring ───────────────────────────────────────────────────────────────

async fn start_monitoring(State(state): State<AppState>) -> ApiResult {
    state.monitor.start().await?;
    Ok(Json(json!({ "status": "success", "message": "Monitoring started" })))
}

async fn stop_monitoring(State(state): State<AppState>) -> ApiResult {
    let message = if state.monitor.stop().await {
        "Monitoring stopped"
    } else {
        "Monitoring was not running"
    };
    Ok(Json(json!({ "status": "success", "message": message })))
}

async fn monitoring_status(State(state): State<AppState>) -> Json<Value> {
    let status = state.monitor.status().await;
    Json(json!({
        "status": "success",
        "running": status.state == MonitorState::Running,
        "state": status.state,
        "market_mode": status.market_mode,
        "pair_count": status.pair_count,
    }))
}

async fn toggle_market_mode(State(state): State<AppState>) -> Json<Value> {
    let mode = state.monitor.toggle_market_mode().await;
    Json(json!({
        "status": "success",
        "market_mode": mode,
        "derivative": mode == MarketMode::Derivative,
    }))
}

// ─── Pairs ────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PairBody {
    pair: String,
    #[serde(default)]
    upper: f64,
    #[serde(default)]
    lower: f64,
}

#[derive(Deserialize)]
struct PairRef {
    pair: Option<String>,
}

async fn list_pairs(State(state): State<AppState>) -> Json<Value> {
    let pairs = state.monitor.pairs().await;
    Json(json!({ "status": "success", "pairs": pairs }))
}

async fn add_pair(State(state): State<AppState>, Json(body): Json<PairBody>) -> ApiResult {
    let pair = Pair::parse(&body.pair)?;
    state
        .monitor
        .add_pair(pair.clone(), Thresholds::new(body.upper, body.lower))
        .await?;
    Ok(Json(json!({
        "status": "success",
        "message": format!("Added {pair}"),
        "pair": pair,
    })))
}

async fn update_pair(State(state): State<AppState>, Json(body): Json<PairBody>) -> ApiResult {
    let pair = Pair::parse(&body.pair)?;
    state
        .monitor
        .update_pair(&pair, Thresholds::new(body.upper, body.lower))
        .await?;
    Ok(Json(json!({
        "status": "success",
        "message": format!("Updated {pair}"),
        "pair": pair,
    })))
}

async fn delete_pair(State(state): State<AppState>, Json(body): Json<PairBody>) -> ApiResult {
    let pair = Pair::parse(&body.pair)?;
    state.monitor.delete_pair(&pair).await?;
    Ok(Json(json!({
        "status": "success",
        "message": format!("Deleted {pair}"),
    })))
}

// ─── Notifications ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct NtfyBody {
    server: String,
    topic: String,
    /// Absent keeps the stored password; an empty string clears it.
    password: Option<String>,
}

impl NtfyBody {
    async fn resolve(self, state: &AppState) -> NtfyConfig {
        let password = match self.password {
            Some(password) => password,
            None => state.monitor.ntfy_config().await.password,
        };
        NtfyConfig::new(self.server, self.topic, password)
    }
}

async fn get_ntfy_config(State(state): State<AppState>) -> Json<Value> {
    let ntfy = state.monitor.ntfy_config().await;
    Json(json!({
        "status": "success",
        "server": ntfy.server,
        "topic": ntfy.topic,
        "has_password": !ntfy.password.is_empty(),
    }))
}

async fn set_ntfy_config(State(state): State<AppState>, Json(body): Json<NtfyBody>) -> ApiResult {
    let ntfy = body.resolve(&state).await;
    state.monitor.set_ntfy_config(ntfy).await?;
    Ok(Json(json!({ "status": "success", "message": "NTFY configuration saved" })))
}

async fn test_ntfy(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let ntfy = match optional_body::<NtfyBody>(&body, ConfigSection::Ntfy)? {
        Some(body) => Some(body.resolve(&state).await),
        None => None,
    };
    state.monitor.send_test_notification(ntfy).await?;
    Ok(Json(json!({ "status": "success", "message": "Test notification sent" })))
}

// ─── Alerts ───────────────────────────────────────────────────────────────────

async fn reset_alerts(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let pair = optional_body::<PairRef>(&body, ConfigSection::Monitoring)?
        .and_then(|b| b.pair)
        .filter(|p| !p.trim().is_empty())
        .map(|p| Pair::parse(&p))
        .transpose()?;
    state.monitor.reset_alerts(pair.as_ref()).await?;
    let message = match &pair {
        Some(pair) => format!("Alerts reset for {pair}"),
        None => "Alerts reset for all pairs".to_string(),
    };
    Ok(Json(json!({ "status": "success", "message": message })))
}

async fn alert_status(State(state): State<AppState>, Query(q): Query<PairRef>) -> ApiResult {
    let pair = q
        .pair
        .filter(|p| !p.trim().is_empty())
        .map(|p| Pair::parse(&p))
        .transpose()?;
    let alerts = state.monitor.alert_status(pair.as_ref()).await?;
    Ok(Json(json!({ "status": "success", "alerts": alerts })))
}

async fn no_derivative_coins(State(state): State<AppState>) -> Json<Value> {
    let coins = state.monitor.no_derivative_coins().await;
    Json(json!({
        "status": "success",
        "count": coins.len(),
        "coins": coins,
    }))
}
