//! # state
//!
//! The **shared application state** between the Loop Supervisor (the only
//! writer) and the HTTP handlers (readers only, apart from the pause flag).
//!
//! ## Access rules
//!
//! * Price/signal histories, the latest signal, the published snapshot and
//!   the ledger are mutated exclusively by the supervisor task.
//! * Handlers take short read locks and clone what they need out.
//! * `RwLock` from `tokio::sync` so a long supervisor write never blocks an
//!   OS thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use crate::config::BotConfig;
use crate::engine::ledger::Ledger;
use crate::events::WsEvent;
use crate::models::{BoundedHistory, Confidence, Direction, OracleReading, PriceObservation, TradeSignal};

/// Trailing price observations kept for indicators.
pub const PRICE_HISTORY_LEN: usize = 20;
/// Trailing signals kept as prompt context.
pub const SIGNAL_HISTORY_LEN: usize = 30;

// ─── StatusSnapshot ───────────────────────────────────────────────────────────

/// What observers see after each completed cycle. The last one stays
/// visible until the next cycle succeeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub instrument:  String,
    pub price:       f64,
    pub change_pct:  f64,
    pub direction:   Direction,
    pub confidence:  Confidence,
    pub position:    OracleReading,
    /// Total balance minus the inception baseline.
    pub total_pnl:   f64,
    pub test_mode:   bool,
    pub timestamp:   DateTime<Utc>,
}

// ─── AppState ─────────────────────────────────────────────────────────────────

/// Top-level shared state injected into every Axum handler.
pub struct AppState {
    // ── Loop-owned ────────────────────────────────────────────────────────────
    pub price_history:  RwLock<BoundedHistory<PriceObservation>>,
    pub signal_history: RwLock<BoundedHistory<TradeSignal>>,
    /// Seeded from `latest_signal.json` at startup.
    pub latest_signal:  RwLock<Option<TradeSignal>>,
    /// `None` until the first cycle completes.
    pub snapshot:       RwLock<Option<StatusSnapshot>>,
    pub ledger:         RwLock<Ledger>,
    /// Copy of the config the current/last cycle ran with.
    pub bot_config:     RwLock<BotConfig>,

    // ── Controls ──────────────────────────────────────────────────────────────
    paused:             AtomicBool,

    // ── Monitor / WebSocket ───────────────────────────────────────────────────
    /// Pre-serialized JSON events for WebSocket clients.
    pub broadcast_tx:   broadcast::Sender<String>,

    // ── Metrics ───────────────────────────────────────────────────────────────
    pub cycle_count:    AtomicU64,
    pub failure_count:  AtomicU64,

    /// `X-API-Key` required by the HTTP surface; `None` = open.
    pub api_key:        Option<String>,
}

impl AppState {
    pub fn new(
        ledger: Ledger,
        bot_config: BotConfig,
        latest_signal: Option<TradeSignal>,
        api_key: Option<String>,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);

        Self {
            price_history:  RwLock::new(BoundedHistory::new(PRICE_HISTORY_LEN)),
            signal_history: RwLock::new(BoundedHistory::new(SIGNAL_HISTORY_LEN)),
            latest_signal:  RwLock::new(latest_signal),
            snapshot:       RwLock::new(None),
            ledger:         RwLock::new(ledger),
            bot_config:     RwLock::new(bot_config),
            paused:         AtomicBool::new(false),
            broadcast_tx,
            cycle_count:    AtomicU64::new(0),
            failure_count:  AtomicU64::new(0),
            api_key,
        }
    }

    // ── Helper Methods ────────────────────────────────────────────────────────

    /// Sends to every WebSocket client. No listeners is not an error.
    pub fn broadcast(&self, event: &WsEvent) {
        let _ = self.broadcast_tx.send(event.to_json());
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Returns the previous value.
    pub fn set_paused(&self, paused: bool) -> bool {
        self.paused.swap(paused, Ordering::Relaxed)
    }
}

/// Convenience type alias
pub type SharedState = Arc<AppState>;

#[cfg(test)]
pub(crate) async fn test_state(data_dir: &std::path::Path) -> SharedState {
    Arc::new(AppState::new(Ledger::load(data_dir).await, BotConfig::default(), None, None))
}
