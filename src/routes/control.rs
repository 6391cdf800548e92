//! # routes::control
//!
//! | Method | Path               | Description                              |
//! |--------|--------------------|------------------------------------------|
//! | POST   | `/api/bot/pause`   | stop issuing cycles after the current one |
//! | POST   | `/api/bot/resume`  | resume cycles                            |
//! | GET    | `/health`          | liveness, never authenticated            |

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use tracing::info;

use crate::{events::WsEvent, state::SharedState};

/// POST /api/bot/pause
pub async fn pause_bot(State(state): State<SharedState>) -> impl IntoResponse {
    let was_paused = state.set_paused(true);
    if !was_paused {
        info!("⏸️ bot paused via API");
        state.broadcast(&WsEvent::BotPaused);
    }

    Json(json!({
        "ok":      true,
        "running": false,
        "message": if was_paused { "Bot already paused" } else { "Bot paused — the in-flight cycle will finish" },
    }))
}

/// POST /api/bot/resume
pub async fn resume_bot(State(state): State<SharedState>) -> impl IntoResponse {
    let was_paused = state.set_paused(false);
    if was_paused {
        info!("▶️ bot resumed via API");
        state.broadcast(&WsEvent::BotResumed);
    }

    Json(json!({
        "ok":      true,
        "running": true,
        "message": if was_paused { "Bot resumed" } else { "Bot already running" },
    }))
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "ok":      true,
        "service": "tidewatch",
        "time":    chrono::Utc::now().to_rfc3339(),
    }))
}
