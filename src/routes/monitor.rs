//! # routes::monitor
//!
//! **Published state** — read-only views for dashboards.
//!
//! ## Endpoints
//!
//! | Method    | Path                  | Description                                  |
//! |-----------|-----------------------|----------------------------------------------|
//! | GET (WS)  | `/ws/monitor`         | snapshot on connect, then every broadcast    |
//! | GET       | `/api/status`         | last snapshot, running flag, bot config      |
//! | GET       | `/api/signals`        | bounded signal history, newest last          |
//! | GET       | `/api/signals/latest` | last known signal (survives restarts)        |
//! | GET       | `/api/equity_curve`   | last 100 points + derived statistics         |
//! | GET       | `/api/stats`          | closed-trade counters and win rate           |

use std::sync::atomic::Ordering;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tracing::{debug, info};

use crate::{error::AppError, state::SharedState};

/// Equity points returned by `/api/equity_curve`.
pub const EQUITY_POINTS_SHOWN: usize = 100;

// ─── WebSocket Handler ────────────────────────────────────────────────────────

pub async fn ws_monitor(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 WebSocket client connected");

    // ── Current snapshot first ────────────────────────────────────────────────
    let snapshot = {
        let snapshot = state.snapshot.read().await.clone();
        json!({
            "event":    "SNAPSHOT",
            "snapshot": snapshot,
            "running":  !state.is_paused(),
        })
        .to_string()
    };

    if sender.send(Message::Text(snapshot)).await.is_err() {
        return;
    }

    // ── Event Loop ────────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!("WS client lagged, skipped {n} events");
                    }
                    Err(_) => break,
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 WebSocket client disconnected");
}

// ─── REST Endpoints ───────────────────────────────────────────────────────────

/// GET /api/status
pub async fn get_status(State(state): State<SharedState>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await.clone();
    let bot_config = state.bot_config.read().await.clone();

    Json(json!({
        "ok":            true,
        "running":       !state.is_paused(),
        "snapshot":      snapshot,
        "bot_config":    bot_config,
        "cycle_count":   state.cycle_count.load(Ordering::Relaxed),
        "failure_count": state.failure_count.load(Ordering::Relaxed),
    }))
}

/// GET /api/signals
pub async fn get_signals(State(state): State<SharedState>) -> impl IntoResponse {
    let history = state.signal_history.read().await;
    Json(json!({
        "ok":      true,
        "count":   history.len(),
        "signals": *history,
    }))
}

/// GET /api/signals/latest
pub async fn get_latest_signal(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, AppError> {
    let latest = state.latest_signal.read().await.clone();
    let signal = latest.ok_or_else(|| AppError::NotFound("no signal has been generated yet".into()))?;
    Ok(Json(json!({ "ok": true, "signal": signal })))
}

/// GET /api/equity_curve
pub async fn get_equity_curve(State(state): State<SharedState>) -> impl IntoResponse {
    let live_balance = state
        .snapshot
        .read()
        .await
        .as_ref()
        .map(|s| s.position.balance().total_balance);

    let ledger = state.ledger.read().await;
    let curve = ledger.curve();
    let shown = &curve[curve.len().saturating_sub(EQUITY_POINTS_SHOWN)..];

    Json(json!({
        "ok":      true,
        "total":   curve.len(),
        "points":  shown,
        "summary": ledger.summary(live_balance),
    }))
}

/// GET /api/stats
pub async fn get_stats(State(state): State<SharedState>) -> impl IntoResponse {
    let ledger = state.ledger.read().await;
    let stats = ledger.stats();

    Json(json!({
        "ok":             true,
        "total_trades":   stats.total_trades,
        "winning_trades": stats.winning_trades,
        "losing_trades":  stats.losing_trades,
        "win_rate":       stats.win_rate(),
        "last_updated":   stats.last_updated,
    }))
}
