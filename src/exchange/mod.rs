//! # exchange
//!
//! The narrow functional contract the loop needs from a derivatives
//! exchange. Everything wire-level (signing, envelopes, field spelling of the
//! REST API) lives behind [`Exchange`]; the engine only sees the raw records
//! below and a single [`ExchangeError`].
//!
//! Raw numeric fields stay `Option<String>` because OKX sends numbers as
//! strings and uses `""` for "not applicable" — the Position Oracle owns the
//! fallback rules for turning them into numbers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Candle, Timeframe};

pub mod okx;

#[cfg(test)]
pub mod testing;

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Network failure or timeout before a response arrived.
    #[error("exchange unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("exchange HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Envelope `code != "0"`.
    #[error("exchange API error {code}: {msg}")]
    Api { code: String, msg: String },

    /// The request was well formed but a business rule refused it
    /// (insufficient margin, reduce-only conflict, ...).
    #[error("order rejected ({code}): {msg}")]
    Rejected { code: String, msg: String },

    #[error("malformed exchange payload: {0}")]
    Malformed(String),
}

// ─── Raw records ──────────────────────────────────────────────────────────────

/// Position record for one instrument as the exchange reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawPosition {
    pub inst_id:   String,
    /// Signed quantity: positive long, negative short.
    pub pos:       Option<String>,
    pub avg_px:    Option<String>,
    pub mark_px:   Option<String>,
    pub upl:       Option<String>,
    pub lever:     Option<String>,
    /// Initial margin requirement.
    pub imr:       Option<String>,
    /// Maintenance margin requirement.
    pub mmr:       Option<String>,
    /// Maintenance margin ratio as a fraction.
    pub mgn_ratio: Option<String>,
    pub liq_px:    Option<String>,
}

/// Per-currency row inside the balance record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawBalanceDetail {
    pub ccy:       String,
    pub avail_bal: Option<String>,
    pub avail_eq:  Option<String>,
    pub eq:        Option<String>,
    pub cash_bal:  Option<String>,
}

/// Account-level balance record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawBalance {
    pub total_eq: Option<String>,
    pub avail_eq: Option<String>,
    pub eq_usd:   Option<String>,
    pub details:  Vec<RawBalanceDetail>,
}

// ─── Orders ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy  => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// A market order request. Market orders carry no price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketOrder {
    pub instrument:      String,
    pub side:            OrderSide,
    pub size:            f64,
    pub reduce_only:     bool,
    pub client_order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id:        String,
    pub client_order_id: String,
}

/// Fill details of a submitted order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderFill {
    pub state:        String,
    pub filled_size:  f64,
    pub average_px:   f64,
    /// Exchange-reported realized PnL; only set for closing fills.
    pub realized_pnl: Option<f64>,
}

// ─── Contract ─────────────────────────────────────────────────────────────────

/// Exchange collaborator consumed by the engine. All calls are
/// request/response and must time out on their own.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// OHLCV rows in the exchange's native order (callers sort).
    async fn get_candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// `None` when the exchange holds no record for the instrument.
    async fn get_position(&self, instrument: &str) -> Result<Option<RawPosition>, ExchangeError>;

    async fn get_balance(&self, currency: &str) -> Result<RawBalance, ExchangeError>;

    async fn submit_market_order(&self, order: &MarketOrder) -> Result<OrderReceipt, ExchangeError>;

    async fn get_order(&self, instrument: &str, order_id: &str) -> Result<OrderFill, ExchangeError>;

    async fn set_leverage(&self, instrument: &str, leverage: u32) -> Result<(), ExchangeError>;
}
