//! # engine::ledger
//!
//! **Ledger** — closed-trade counters and the equity curve, the only state
//! that survives a restart.
//!
//! ## Rules
//! - A trade is counted only when this cycle's *closing* order filled and
//!   the post-trade position is strictly smaller on the same (or flat) side.
//! - An equity point is appended when the realized balance (total balance
//!   minus open-position PnL) moved by more than [`BALANCE_EPSILON`] since
//!   the last point. Mark-to-market swings of a held position never add
//!   points. Timestamps never go backwards.
//! - Drawdown is derived on demand, never stored.
//!
//! Both documents are rewritten after every mutation.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use super::reconciler::{Execution, OrderAction};
use crate::models::{EquityPoint, OracleReading, TradeStats};
use crate::store;

pub const STATS_FILE: &str = "trade_stats.json";
pub const EQUITY_FILE: &str = "equity_curve.json";

/// Balance changes at or below this are noise.
pub const BALANCE_EPSILON: f64 = 0.01;

// ─── Derived statistics ───────────────────────────────────────────────────────

/// Running maximum at each index.
pub fn running_max(balances: &[f64]) -> Vec<f64> {
    balances
        .iter()
        .scan(f64::NEG_INFINITY, |peak, &b| {
            *peak = peak.max(b);
            Some(*peak)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DrawdownStats {
    pub peak:                 f64,
    /// Percent, `<= 0`.
    pub current_drawdown_pct: f64,
    /// Most negative drawdown over the series, percent.
    pub max_drawdown_pct:     f64,
}

pub fn drawdown(balances: &[f64]) -> Option<DrawdownStats> {
    let peaks = running_max(balances);
    let mut max_drawdown_pct: f64 = 0.0;
    let mut current_drawdown_pct = 0.0;

    for (&balance, &peak) in balances.iter().zip(&peaks) {
        current_drawdown_pct = if peak > 0.0 { (balance - peak) / peak * 100.0 } else { 0.0 };
        max_drawdown_pct = max_drawdown_pct.min(current_drawdown_pct);
    }

    peaks.last().map(|&peak| DrawdownStats {
        peak,
        current_drawdown_pct,
        max_drawdown_pct,
    })
}

/// Everything the equity view shows beside the raw points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquitySummary {
    pub initial_balance:  f64,
    pub current_balance:  f64,
    pub max_balance:      f64,
    pub min_balance:      f64,
    pub total_return_pct: f64,
    pub drawdown:         DrawdownStats,
}

/// A close counted by this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub size:         f64,
    pub realized_pnl: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerUpdate {
    pub closed:       Option<ClosedTrade>,
    pub equity_point: Option<EquityPoint>,
}

// ─── Ledger ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Ledger {
    stats_path:  PathBuf,
    equity_path: PathBuf,
    stats:       TradeStats,
    curve:       Vec<EquityPoint>,
}

impl Ledger {
    /// Missing files start empty; corrupt files are logged and start empty
    /// (the next save overwrites them).
    pub async fn load(data_dir: &Path) -> Self {
        let stats_path = data_dir.join(STATS_FILE);
        let equity_path = data_dir.join(EQUITY_FILE);

        let stats = match store::load_json::<TradeStats>(&stats_path).await {
            Ok(stats) => stats.unwrap_or_default(),
            Err(e) => {
                error!(error = %e, "❌ trade stats unreadable — starting from zero");
                TradeStats::default()
            }
        };
        let curve = match store::load_json::<Vec<EquityPoint>>(&equity_path).await {
            Ok(curve) => curve.unwrap_or_default(),
            Err(e) => {
                error!(error = %e, "❌ equity curve unreadable — starting empty");
                Vec::new()
            }
        };

        info!(
            trades = stats.total_trades,
            points = curve.len(),
            "📒 ledger loaded"
        );

        Self { stats_path, equity_path, stats, curve }
    }

    pub fn stats(&self) -> &TradeStats {
        &self.stats
    }

    pub fn curve(&self) -> &[EquityPoint] {
        &self.curve
    }

    pub fn initial_balance(&self) -> Option<f64> {
        self.curve.first().map(|p| p.balance)
    }

    /// Live total balance against the inception baseline. Before a baseline
    /// exists (always the case in test mode) the configured starting capital
    /// stands in. 0 when either side is unknown.
    pub fn total_pnl(&self, live_total: f64, base_usdt_amount: f64) -> f64 {
        let baseline = self
            .initial_balance()
            .or_else(|| (base_usdt_amount > 0.0).then_some(base_usdt_amount));
        match baseline {
            Some(baseline) if live_total != 0.0 => live_total - baseline,
            _ => 0.0,
        }
    }

    /// Curve statistics, optionally including a live (unrealized-inclusive)
    /// balance that is not on the curve.
    pub fn summary(&self, live_balance: Option<f64>) -> Option<EquitySummary> {
        let mut balances: Vec<f64> = self.curve.iter().map(|p| p.balance).collect();
        if let Some(live) = live_balance.filter(|b| *b != 0.0) {
            balances.push(live);
        }

        let initial_balance = *balances.first()?;
        let current_balance = *balances.last()?;
        let drawdown = drawdown(&balances)?;

        Some(EquitySummary {
            initial_balance,
            current_balance,
            max_balance: balances.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            min_balance: balances.iter().copied().fold(f64::INFINITY, f64::min),
            total_return_pct: if initial_balance > 0.0 {
                (current_balance - initial_balance) / initial_balance * 100.0
            } else {
                0.0
            },
            drawdown,
        })
    }

    /// Folds one cycle into the ledger. Persistence failures are logged and
    /// do not undo the in-memory update.
    pub async fn record_cycle(
        &mut self,
        before: &OracleReading,
        after: &OracleReading,
        execution: &Execution,
        base_usdt_amount: f64,
    ) -> LedgerUpdate {
        let mut update = LedgerUpdate::default();

        if let Some(closed) = detect_close(before, after, execution) {
            self.stats.total_trades += 1;
            if closed.realized_pnl > 0.0 {
                self.stats.winning_trades += 1;
            } else if closed.realized_pnl < 0.0 {
                self.stats.losing_trades += 1;
            }
            self.stats.last_updated = Some(Utc::now());

            info!(
                pnl      = closed.realized_pnl,
                total    = self.stats.total_trades,
                wins     = self.stats.winning_trades,
                losses   = self.stats.losing_trades,
                "📒 trade closed"
            );

            if let Err(e) = store::save_json(&self.stats_path, &self.stats).await {
                error!(error = %e, "❌ failed to persist trade stats");
            }
            update.closed = Some(closed);
        }

        let total = after.realized_balance();
        let mut curve_changed = self.ensure_baseline(base_usdt_amount, total);
        update.equity_point = self.append_if_moved(total);
        curve_changed |= update.equity_point.is_some();

        if curve_changed {
            if let Err(e) = store::save_json(&self.equity_path, &self.curve).await {
                error!(error = %e, "❌ failed to persist equity curve");
            }
        }

        update
    }

    fn ensure_baseline(&mut self, base_usdt_amount: f64, observed: f64) -> bool {
        if !self.curve.is_empty() {
            return false;
        }
        let baseline = if base_usdt_amount > 0.0 { base_usdt_amount } else { observed };
        if baseline == 0.0 {
            return false;
        }

        info!(baseline, "📒 equity baseline set");
        self.curve.push(EquityPoint {
            timestamp:          Utc::now(),
            balance:            baseline,
            realized_pnl_delta: 0.0,
            pnl_percent:        0.0,
        });
        true
    }

    fn append_if_moved(&mut self, total: f64) -> Option<EquityPoint> {
        // Zero is indistinguishable from "no field" and would fake a -100 % drop.
        if total == 0.0 {
            return None;
        }
        let last = *self.curve.last()?;
        let initial = self.initial_balance()?;
        if (total - last.balance).abs() <= BALANCE_EPSILON {
            return None;
        }

        let point = EquityPoint {
            timestamp:          Utc::now().max(last.timestamp),
            balance:            total,
            realized_pnl_delta: total - last.balance,
            pnl_percent:        (total - initial) / initial * 100.0,
        };
        self.curve.push(point);
        Some(point)
    }
}

/// `Some` only when this cycle's close order filled and the position shrank
/// without flipping.
fn detect_close(
    before: &OracleReading,
    after: &OracleReading,
    execution: &Execution,
) -> Option<ClosedTrade> {
    let Execution::Filled { action: OrderAction::Close { .. }, fill, .. } = execution else {
        return None;
    };
    let prior = before.position()?;

    let shrank = after.size() < before.size();
    let same_side = after.side() == before.side() || after.position().is_none();
    if !(shrank && same_side) {
        warn!(
            before = %before.summary(),
            after  = %after.summary(),
            "⚠️ close filled but position did not shrink — not counted"
        );
        return None;
    }

    let closed_size = before.size() - after.size();
    let realized_pnl = fill
        .as_ref()
        .and_then(|f| f.realized_pnl)
        .unwrap_or_else(|| prior.unrealized_pnl * closed_size / prior.size);

    Some(ClosedTrade { size: closed_size, realized_pnl })
}
