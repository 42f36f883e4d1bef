use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub fn health_router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

/// Liveness probe for ops scripts and container health checks.
async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let status = state.monitor.status().await;
    Json(json!({
        "status": "ok",
        "monitor": status.state.to_string(),
        "market_mode": status.market_mode.to_string(),
    }))
}
