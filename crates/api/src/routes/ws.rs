use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use common::PriceBoard;
use engine::Monitor;

use crate::AppState;

pub fn ws_router() -> Router<AppState> {
    Router::new().route("/ws/prices", get(ws_prices_handler))
}

/// WebSocket endpoint streaming the price board after every monitoring
/// cycle. Overlay-style clients connect here instead of polling.
async fn ws_prices_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    // Subscribe before the upgrade so no board published meanwhile is lost
    let board_rx = state.monitor.subscribe_prices();
    let monitor = state.monitor.clone();
    ws.on_upgrade(move |socket| handle_ws(socket, monitor, board_rx))
}

async fn handle_ws(
    mut socket: WebSocket,
    monitor: Monitor,
    mut board_rx: broadcast::Receiver<PriceBoard>,
) {
    // Current board first so the client renders immediately
    let current = monitor.prices().await;
    if socket.send(frame(&current)).await.is_err() {
        return;
    }

    loop {
        match board_rx.recv().await {
            Ok(board) => {
                if socket.send(frame(&board)).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(n)) => {
                warn!(dropped = n, "WebSocket price client lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn frame(board: &PriceBoard) -> Message {
    let body = json!({
        "prices": board,
        "timestamp": chrono::Local::now().format("%H:%M:%S").to_string(),
    });
    Message::Text(body.to_string())
}
