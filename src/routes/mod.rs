//! HTTP surface: read-only views of the published state plus the pause
//! switch. Handlers never touch the loop-owned state except through
//! `AppState::set_paused`.

pub mod control;
pub mod monitor;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::require_api_key;
use crate::state::SharedState;
use control::{health_check, pause_bot, resume_bot};
use monitor::{get_equity_curve, get_latest_signal, get_signals, get_stats, get_status, ws_monitor};

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Published state ───────────────────────────────────────────────────
        .route("/ws/monitor",         get(ws_monitor))
        .route("/api/status",         get(get_status))
        .route("/api/signals",        get(get_signals))
        .route("/api/signals/latest", get(get_latest_signal))
        .route("/api/equity_curve",   get(get_equity_curve))
        .route("/api/stats",          get(get_stats))
        // ── Controls ──────────────────────────────────────────────────────────
        .route("/api/bot/pause",      post(pause_bot))
        .route("/api/bot/resume",     post(resume_bot))
        .route("/health",             get(health_check))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;
    use crate::engine::ledger::Ledger;
    use crate::models::{AccountBalance, Confidence, Direction, OracleReading};
    use crate::state::{test_state, AppState, StatusSnapshot};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn call(app: Router, method: &str, uri: &str, key: Option<&str>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            req = req.header("X-API-Key", key);
        }
        let resp = app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_status_before_first_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;

        let (status, body) = call(router(state), "GET", "/api/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["running"], true);
        assert!(body["snapshot"].is_null());
        assert_eq!(body["bot_config"]["timeframe"], "15m");
    }

    #[tokio::test]
    async fn test_status_shows_published_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        *state.snapshot.write().await = Some(StatusSnapshot {
            instrument: "BTC-USDT-SWAP".into(),
            price:      65000.0,
            change_pct: 0.4,
            direction:  Direction::Hold,
            confidence: Confidence::Medium,
            position:   OracleReading::AccountInfoOnly(AccountBalance { free_balance: 1.0, total_balance: 2.0 }),
            total_pnl:  0.0,
            test_mode:  true,
            timestamp:  Utc::now(),
        });

        let (_, body) = call(router(state), "GET", "/api/status", None).await;
        assert_eq!(body["snapshot"]["price"], 65000.0);
        assert_eq!(body["snapshot"]["direction"], "HOLD");
        assert_eq!(body["snapshot"]["position"]["kind"], "account_info_only");
    }

    #[tokio::test]
    async fn test_latest_signal_missing_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;

        let (status, body) = call(router(state), "GET", "/api/signals/latest", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let mut rx = state.broadcast_tx.subscribe();

        let (_, body) = call(router(state.clone()), "POST", "/api/bot/pause", None).await;
        assert_eq!(body["running"], false);
        assert!(state.is_paused());
        assert_eq!(rx.recv().await.unwrap(), r#"{"event":"BOT_PAUSED"}"#);

        call(router(state.clone()), "POST", "/api/bot/resume", None).await;
        assert!(!state.is_paused());
        assert_eq!(rx.recv().await.unwrap(), r#"{"event":"BOT_RESUMED"}"#);
    }

    #[tokio::test]
    async fn test_empty_equity_curve() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;

        let (_, body) = call(router(state), "GET", "/api/equity_curve", None).await;
        assert_eq!(body["total"], 0);
        assert!(body["summary"].is_null());
    }

    #[tokio::test]
    async fn test_api_key_required_except_health() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(AppState::new(
            Ledger::load(dir.path()).await,
            BotConfig::default(),
            None,
            Some("secret".into()),
        ));

        let (status, _) = call(router(state.clone()), "GET", "/api/stats", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(router(state.clone()), "GET", "/api/stats", Some("secret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_trades"], 0);

        let (status, _) = call(router(state), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
