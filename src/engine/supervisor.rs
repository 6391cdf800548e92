//! # engine::supervisor
//!
//! **Loop Supervisor** — the one background task that drives the
//! reconciliation cycle.
//!
//! ```text
//!  reload bot_config ─▶ leverage (if changed)
//!        │
//!        ▼
//!  snapshot ─▶ oracle (pre) ─▶ signal ─▶ reconcile ─▶ oracle (post) ─▶ ledger ─▶ publish
//!        │            │            │                         │
//!        └────────────┴────────────┴── any failure ──────────┴─▶ log, sleep backoff, restart
//! ```
//!
//! Cycles never overlap. Shutdown is only observed while sleeping, so an
//! in-flight cycle (and any order it is submitting) always completes.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::ledger::LedgerUpdate;
use super::market::MarketSnapshotProvider;
use super::oracle::PositionOracle;
use super::reconciler::{Execution, OrderAction, Reconciler};
use crate::brain::{Inference, SignalGenerator};
use crate::config::{BotConfig, Config, ConfigStore};
use crate::error::CycleError;
use crate::events::WsEvent;
use crate::exchange::{Exchange, OrderSide};
use crate::models::{OracleReading, PositionState, Side, TradeSignal};
use crate::state::{SharedState, StatusSnapshot};
use crate::store;

pub const LATEST_SIGNAL_FILE: &str = "latest_signal.json";

/// How often a paused loop checks whether it was resumed.
const PAUSE_POLL: Duration = Duration::from_secs(1);

/// Outcome of one successful cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub signal:    TradeSignal,
    pub before:    OracleReading,
    pub after:     OracleReading,
    pub execution: Execution,
    pub ledger:    Option<LedgerUpdate>,
}

pub struct Supervisor {
    state:              SharedState,
    exchange:           Arc<dyn Exchange>,
    config_store:       ConfigStore,
    market:             MarketSnapshotProvider,
    oracle:             PositionOracle,
    signals:            SignalGenerator,
    reconciler:         Reconciler,
    instrument:         String,
    latest_signal_path: PathBuf,
    retry_backoff:      Duration,
    settle_delay:       Duration,
    applied_leverage:   Option<u32>,
}

impl Supervisor {
    pub fn new(
        state: SharedState,
        exchange: Arc<dyn Exchange>,
        inference: Arc<dyn Inference>,
        config: &Config,
    ) -> Self {
        let instrument = config.instrument.clone();
        Self {
            market:             MarketSnapshotProvider::new(exchange.clone(), &instrument),
            oracle:             PositionOracle::new(exchange.clone(), &instrument),
            signals:            SignalGenerator::new(inference, &instrument),
            reconciler:         Reconciler::new(exchange.clone(), &instrument),
            config_store:       ConfigStore::new(&config.data_dir),
            latest_signal_path: config.data_dir.join(LATEST_SIGNAL_FILE),
            retry_backoff:      config.retry_backoff,
            settle_delay:       config.settle_delay,
            applied_leverage:   None,
            state,
            exchange,
            instrument,
        }
    }

    /// Runs until `shutdown` flips to `true` (or its sender is dropped).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(instrument = %self.instrument, "🔁 reconciliation loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let bot = self.config_store.load().await;
            *self.state.bot_config.write().await = bot.clone();

            if self.state.is_paused() {
                debug!("loop paused");
                if sleep_or_shutdown(PAUSE_POLL, &mut shutdown).await {
                    break;
                }
                continue;
            }

            self.apply_leverage(bot.leverage).await;

            let wait = match self.run_cycle(&bot).await {
                Ok(_) => bot.interval(),
                Err(e) => {
                    self.state.failure_count.fetch_add(1, Ordering::Relaxed);
                    error!(
                        stage   = e.stage(),
                        error   = %e,
                        backoff = ?self.retry_backoff,
                        "❌ cycle failed — backing off"
                    );
                    self.retry_backoff
                }
            };

            if sleep_or_shutdown(wait, &mut shutdown).await {
                break;
            }
        }

        info!("🛑 reconciliation loop stopped");
    }

    async fn apply_leverage(&mut self, leverage: u32) {
        if self.applied_leverage == Some(leverage) {
            return;
        }
        match self.exchange.set_leverage(&self.instrument, leverage).await {
            Ok(()) => {
                info!(leverage, "⚙️ leverage applied");
                self.applied_leverage = Some(leverage);
            }
            Err(e) => warn!(leverage, error = %e, "⚠️ failed to set leverage — will retry next cycle"),
        }
    }

    /// One full pass. Nothing is carried over when this returns `Err`.
    pub async fn run_cycle(&mut self, bot: &BotConfig) -> Result<CycleReport, CycleError> {
        let cycle = self.state.cycle_count.fetch_add(1, Ordering::Relaxed) + 1;
        info!(cycle, timeframe = %bot.timeframe, test_mode = bot.test_mode, "▶️ cycle start");

        // ── 1. Market snapshot ────────────────────────────────────────────────
        let observation = self.market.fetch(bot.timeframe).await?;
        info!(price = observation.price, change = observation.change_pct, "📈 market snapshot");
        self.state.price_history.write().await.push(observation.clone());

        // ── 2. Position before ────────────────────────────────────────────────
        let before = self
            .oracle
            .fetch(bot.leverage)
            .await
            .map_err(|source| CycleError::PositionUnavailable { stage: "pre-trade", source })?;
        debug!(position = %before.summary(), "position before");

        // ── 3. Signal ─────────────────────────────────────────────────────────
        let prices = self.state.price_history.read().await.clone();
        let signals = self.state.signal_history.read().await.clone();
        let signal = self.signals.generate(&observation, &before, &prices, &signals).await?;

        self.state.signal_history.write().await.push(signal.clone());
        *self.state.latest_signal.write().await = Some(signal.clone());
        if let Err(e) = store::save_json(&self.latest_signal_path, &signal).await {
            warn!(error = %e, "⚠️ failed to persist latest signal");
        }
        self.state.broadcast(&WsEvent::SignalGenerated { signal: Box::new(signal.clone()) });

        // ── 4. Reconcile ──────────────────────────────────────────────────────
        let execution = self
            .reconciler
            .execute(&before, &signal, bot.order_size, bot.test_mode)
            .await;
        self.broadcast_execution(&execution);

        // ── 5. Position after ─────────────────────────────────────────────────
        let after = match &execution {
            Execution::Rejected { .. } | Execution::Failed { .. } => before.clone(),
            Execution::Filled { .. } => {
                tokio::time::sleep(self.settle_delay).await;
                match self.read_after(bot.leverage).await {
                    Ok(after) => after,
                    // The order is on the exchange already; the fill stands in
                    // for the missing read so the close is still counted.
                    Err(e) => {
                        let after = settled_reading(&before, &execution);
                        warn!(
                            error = %e,
                            assumed = %after.summary(),
                            "⚠️ post-trade read failed after a fill — using the fill"
                        );
                        after
                    }
                }
            }
            Execution::NoAction | Execution::Simulated(_) => self.read_after(bot.leverage).await?,
        };

        // ── 6. Ledger ─────────────────────────────────────────────────────────
        let ledger_update = if bot.test_mode {
            None
        } else {
            let mut ledger = self.state.ledger.write().await;
            let update = ledger
                .record_cycle(&before, &after, &execution, bot.base_usdt_amount)
                .await;
            if let Some(trade) = update.closed {
                self.state.broadcast(&WsEvent::PositionClosed {
                    trade,
                    total_trades: ledger.stats().total_trades,
                    win_rate:     ledger.stats().win_rate(),
                });
            }
            Some(update)
        };

        // ── 7. Publish ────────────────────────────────────────────────────────
        let total_pnl = self
            .state
            .ledger
            .read()
            .await
            .total_pnl(after.balance().total_balance, bot.base_usdt_amount);
        let snapshot = StatusSnapshot {
            instrument:  self.instrument.clone(),
            price:       observation.price,
            change_pct:  observation.change_pct,
            direction:   signal.direction,
            confidence:  signal.confidence,
            position:    after.clone(),
            total_pnl,
            test_mode:   bot.test_mode,
            timestamp:   Utc::now(),
        };
        *self.state.snapshot.write().await = Some(snapshot.clone());
        self.state.broadcast(&WsEvent::CycleCompleted { snapshot: Box::new(snapshot) });

        info!(
            cycle,
            signal   = signal.direction.as_str(),
            position = %after.summary(),
            total_pnl,
            "✅ cycle complete"
        );

        Ok(CycleReport { signal, before, after, execution, ledger: ledger_update })
    }

    async fn read_after(&self, leverage: u32) -> Result<OracleReading, CycleError> {
        self.oracle
            .fetch(leverage)
            .await
            .map_err(|source| CycleError::PositionUnavailable { stage: "post-trade", source })
    }

    fn broadcast_execution(&self, execution: &Execution) {
        let event = match execution {
            Execution::NoAction => return,
            Execution::Simulated(action) => WsEvent::TradeSimulated { action: *action },
            Execution::Filled { action, receipt, fill } => WsEvent::OrderFilled {
                action:      *action,
                order_id:    receipt.order_id.clone(),
                filled_size: fill.as_ref().map(|f| f.filled_size),
                average_px:  fill.as_ref().map(|f| f.average_px),
            },
            Execution::Rejected { action, reason } => WsEvent::OrderRejected {
                action: *action,
                reason: reason.clone(),
            },
            Execution::Failed { action, reason } => {
                // Transport detail stays in the logs.
                debug!(reason = %reason, "order failure hidden from observers");
                WsEvent::OrderRejected {
                    action: *action,
                    reason: "order could not be submitted".to_string(),
                }
            }
        };
        self.state.broadcast(&event);
    }
}

/// Position implied by `before` plus a filled order, for when the exchange
/// cannot be read back. Balances carry over from `before`.
fn settled_reading(before: &OracleReading, execution: &Execution) -> OracleReading {
    let Execution::Filled { action, fill, .. } = execution else {
        return before.clone();
    };
    let filled = fill
        .as_ref()
        .map(|f| f.filled_size)
        .filter(|size| *size > 0.0)
        .unwrap_or(action.size());
    let balance = before.balance();

    let signed_qty = match (action, before.position()) {
        (OrderAction::Close { .. }, Some(p)) => {
            let remaining = (p.size - filled).max(0.0);
            if p.side == Side::Short { -remaining } else { remaining }
        }
        (OrderAction::Close { .. }, None) => 0.0,
        (OrderAction::Open { side, .. }, _) => match side {
            OrderSide::Buy  => filled,
            OrderSide::Sell => -filled,
        },
    };
    if signed_qty == 0.0 {
        return OracleReading::AccountInfoOnly(balance);
    }

    let mut state = match before.position() {
        Some(p) => p.clone(),
        None => PositionState::new(signed_qty),
    };
    if let Some(p) = before.position() {
        state.unrealized_pnl = p.unrealized_pnl * signed_qty.abs() / p.size;
        state.size = signed_qty.abs();
    }
    state.free_balance = balance.free_balance;
    state.total_balance = balance.total_balance;
    OracleReading::Open(state)
}

/// `true` when shutdown was requested before `duration` elapsed.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
