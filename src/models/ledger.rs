//! # models::ledger
//!
//! The only state that survives a restart: the equity curve and the trade
//! counters. Both are persisted as whole-document JSON blobs whose schema is
//! exactly these structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point on the equity curve. Index 0 is the inception baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp:          DateTime<Utc>,
    pub balance:            f64,
    /// Balance change against the previous point.
    pub realized_pnl_delta: f64,
    /// Return against the baseline, in percent.
    pub pnl_percent:        f64,
}

/// Closed-trade counters. Only closes are counted, never opens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub total_trades:   u64,
    pub winning_trades: u64,
    pub losing_trades:  u64,
    pub last_updated:   Option<DateTime<Utc>>,
}

impl TradeStats {
    /// Win rate in percent, `None` before the first close.
    pub fn win_rate(&self) -> Option<f64> {
        (self.total_trades > 0)
            .then(|| self.winning_trades as f64 / self.total_trades as f64 * 100.0)
    }
}
