//! # engine::oracle
//!
//! **Position Oracle** — asks the exchange what the account actually holds.
//!
//! Three outcomes, never confused with each other:
//! - `Ok(OracleReading::Open(..))` — a non-zero position with margin detail
//! - `Ok(OracleReading::AccountInfoOnly(..))` — flat, balance figures valid
//!   (a $0 balance is still a valid reading)
//! - `Err(..)` — the exchange could not be read; this is *not* "flat"
//!
//! ## Balance resolution
//! ```text
//! free  = details.availBal → details.availEq → details.eq → 0
//!         (a zero result then tries account-level availEq)
//! total = details.eq → totalEq → eqUsd → details.cashBal
//!         → free + initial margin + unrealized PnL   (only with a position)
//!         → 0
//! ```
//! Total equity is the canonical balance; everything after it is fallback.

use std::sync::Arc;

use tracing::{debug, info};

use crate::exchange::{Exchange, ExchangeError, RawBalance, RawBalanceDetail, RawPosition};
use crate::models::{AccountBalance, OracleReading, PositionState};

/// Settlement currency of USDT-margined swaps.
pub const SETTLEMENT_CCY: &str = "USDT";

pub struct PositionOracle {
    exchange:   Arc<dyn Exchange>,
    instrument: String,
}

impl PositionOracle {
    pub fn new(exchange: Arc<dyn Exchange>, instrument: impl Into<String>) -> Self {
        Self { exchange, instrument: instrument.into() }
    }

    /// Always hits the exchange; nothing is cached between calls.
    /// `configured_leverage` stands in when the record omits `lever`.
    pub async fn fetch(&self, configured_leverage: u32) -> Result<OracleReading, ExchangeError> {
        let raw_position = self.exchange.get_position(&self.instrument).await?;
        let raw_balance = self.exchange.get_balance(SETTLEMENT_CCY).await?;
        resolve_reading(raw_position.as_ref(), &raw_balance, configured_leverage as f64)
    }
}

/// The first candidate that is present, non-blank and numeric.
pub fn first_present(candidates: &[Option<&str>]) -> Option<f64> {
    candidates
        .iter()
        .flatten()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .find_map(|s| s.parse::<f64>().ok())
}

fn settlement_detail(raw: &RawBalance) -> Option<&RawBalanceDetail> {
    raw.details.iter().find(|d| d.ccy == SETTLEMENT_CCY)
}

pub fn resolve_free_balance(raw: &RawBalance) -> f64 {
    let detail = settlement_detail(raw);
    let free = first_present(&[
        detail.and_then(|d| d.avail_bal.as_deref()),
        detail.and_then(|d| d.avail_eq.as_deref()),
        detail.and_then(|d| d.eq.as_deref()),
    ])
    .unwrap_or(0.0);

    if free == 0.0 {
        first_present(&[raw.avail_eq.as_deref()]).unwrap_or(0.0)
    } else {
        free
    }
}

/// Total equity as reported, `None` when no field carries it.
pub fn resolve_total_equity(raw: &RawBalance) -> Option<f64> {
    let detail = settlement_detail(raw);
    first_present(&[
        detail.and_then(|d| d.eq.as_deref()),
        raw.total_eq.as_deref(),
        raw.eq_usd.as_deref(),
        detail.and_then(|d| d.cash_bal.as_deref()),
    ])
}

fn number(field: &'static str, value: &Option<String>) -> Result<Option<f64>, ExchangeError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ExchangeError::Malformed(format!("position field {field} = '{s}'"))),
    }
}

/// Turns the raw records into a reading. Garbage in a present position
/// field is an error, not a flat account.
pub fn resolve_reading(
    raw_position: Option<&RawPosition>,
    raw_balance: &RawBalance,
    default_leverage: f64,
) -> Result<OracleReading, ExchangeError> {
    let free_balance = resolve_free_balance(raw_balance);
    let total_equity = resolve_total_equity(raw_balance);

    let Some(raw) = raw_position else {
        debug!("no position record");
        return Ok(OracleReading::AccountInfoOnly(AccountBalance {
            free_balance,
            total_balance: total_equity.unwrap_or(0.0),
        }));
    };

    let qty = number("pos", &raw.pos)?.unwrap_or(0.0);
    if qty == 0.0 {
        debug!("position record present but empty");
        return Ok(OracleReading::AccountInfoOnly(AccountBalance {
            free_balance,
            total_balance: total_equity.unwrap_or(0.0),
        }));
    }

    let mut state = PositionState::new(qty);
    state.entry_price = number("avgPx", &raw.avg_px)?.unwrap_or(0.0);
    state.mark_price = number("markPx", &raw.mark_px)?.unwrap_or(state.entry_price);
    state.unrealized_pnl = number("upl", &raw.upl)?.unwrap_or(0.0);
    state.leverage = number("lever", &raw.lever)?.unwrap_or(default_leverage);
    state.initial_margin = number("imr", &raw.imr)?.unwrap_or(0.0);
    state.maintenance_margin = number("mmr", &raw.mmr)?.unwrap_or(0.0);
    state.liquidation_price = number("liqPx", &raw.liq_px)?.unwrap_or(0.0);
    // OKX reports the ratio as a fraction.
    state.maintenance_margin_ratio = number("mgnRatio", &raw.mgn_ratio)?
        .filter(|r| *r > 0.0)
        .map(|r| r * 100.0)
        .unwrap_or(0.0);
    state.free_balance = free_balance;
    state.total_balance = match total_equity {
        Some(total) if total != 0.0 => total,
        _ => free_balance + state.initial_margin + state.unrealized_pnl,
    };

    info!(
        side  = %state.side,
        size  = state.size,
        entry = state.entry_price,
        upl   = state.unrealized_pnl,
        liq   = state.liquidation_price,
        "✅ position detected"
    );

    Ok(OracleReading::Open(state))
}
