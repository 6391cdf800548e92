//! # engine::reconciler
//!
//! **Reconciler/Executor** — diffs the signal against the exchange's actual
//! position and submits at most one market order per cycle.
//!
//! ```text
//!  actual \ signal │ BUY            │ SELL            │ HOLD
//!  ────────────────┼────────────────┼─────────────────┼──────
//!  flat            │ open long      │ open short      │ -
//!  long            │ -              │ close long (RO) │ -
//!  short           │ close short(RO)│ -               │ -
//! ```
//! A reversal is never done in one cycle: the close lands first, and the
//! next cycle sees `flat` and opens through the same table.
//!
//! [`plan`] is pure; [`Reconciler::execute`] does the I/O.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::exchange::{Exchange, ExchangeError, MarketOrder, OrderFill, OrderReceipt, OrderSide};
use crate::models::{Direction, OracleReading, Side, TradeSignal};

// ─── OrderAction ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderAction {
    Open  { side: OrderSide, size: f64 },
    /// Reduce-only, always the full position size.
    Close { side: OrderSide, size: f64 },
}

impl OrderAction {
    pub fn side(&self) -> OrderSide {
        match self {
            OrderAction::Open { side, .. } | OrderAction::Close { side, .. } => *side,
        }
    }

    pub fn size(&self) -> f64 {
        match self {
            OrderAction::Open { size, .. } | OrderAction::Close { size, .. } => *size,
        }
    }

    pub fn is_close(&self) -> bool {
        matches!(self, OrderAction::Close { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrderAction::Open  { side: OrderSide::Buy, .. }  => "open long",
            OrderAction::Open  { side: OrderSide::Sell, .. } => "open short",
            OrderAction::Close { side: OrderSide::Sell, .. } => "close long",
            OrderAction::Close { side: OrderSide::Buy, .. }  => "close short",
        }
    }
}

/// The transition table. `None` means the account already matches the
/// signal (or the signal is HOLD).
pub fn plan(reading: &OracleReading, direction: Direction, order_size: f64) -> Option<OrderAction> {
    match (reading.side(), direction) {
        (_, Direction::Hold) => None,
        (Side::Flat, Direction::Buy)  => Some(OrderAction::Open { side: OrderSide::Buy, size: order_size }),
        (Side::Flat, Direction::Sell) => Some(OrderAction::Open { side: OrderSide::Sell, size: order_size }),
        (Side::Long, Direction::Buy) | (Side::Short, Direction::Sell) => None,
        (Side::Long, Direction::Sell) => Some(OrderAction::Close { side: OrderSide::Sell, size: reading.size() }),
        (Side::Short, Direction::Buy) => Some(OrderAction::Close { side: OrderSide::Buy, size: reading.size() }),
    }
}

// ─── Execution ────────────────────────────────────────────────────────────────

/// What happened to this cycle's planned action.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    NoAction,
    /// Dry-run: decided, logged, nothing sent.
    Simulated(OrderAction),
    /// Accepted by the exchange. `fill` is `None` when the follow-up order
    /// query failed.
    Filled {
        action:  OrderAction,
        receipt: OrderReceipt,
        fill:    Option<OrderFill>,
    },
    /// Business-rule refusal (insufficient margin, ...).
    Rejected { action: OrderAction, reason: String },
    /// Never reached the exchange or no usable answer came back.
    Failed { action: OrderAction, reason: String },
}

pub struct Reconciler {
    exchange:   Arc<dyn Exchange>,
    instrument: String,
}

impl Reconciler {
    pub fn new(exchange: Arc<dyn Exchange>, instrument: impl Into<String>) -> Self {
        Self { exchange, instrument: instrument.into() }
    }

    /// Never errors: submission failures come back as `Rejected`/`Failed`
    /// so the cycle can still reach ledger and publish.
    pub async fn execute(
        &self,
        reading: &OracleReading,
        signal: &TradeSignal,
        order_size: f64,
        dry_run: bool,
    ) -> Execution {
        let Some(action) = plan(reading, signal.direction, order_size) else {
            info!(
                actual = %reading.side(),
                signal = signal.direction.as_str(),
                "⏸️ position already aligned — no order"
            );
            return Execution::NoAction;
        };

        if dry_run {
            info!(
                action = action.label(),
                size   = action.size(),
                "🎭 [TEST MODE] order not sent"
            );
            return Execution::Simulated(action);
        }

        let order = MarketOrder {
            instrument:      self.instrument.clone(),
            side:            action.side(),
            size:            action.size(),
            reduce_only:     action.is_close(),
            client_order_id: Uuid::new_v4().simple().to_string(),
        };

        info!(
            action      = action.label(),
            side        = order.side.as_str(),
            size        = order.size,
            reduce_only = order.reduce_only,
            cl_ord_id   = %order.client_order_id,
            "🚀 [EXECUTOR] submitting market order"
        );

        let receipt = match self.exchange.submit_market_order(&order).await {
            Ok(receipt) => receipt,
            Err(ExchangeError::Rejected { code, msg }) => {
                warn!(code = %code, reason = %msg, "❌ order rejected by exchange");
                return Execution::Rejected { action, reason: format!("{code}: {msg}") };
            }
            Err(e) => {
                error!(error = %e, "❌ order submission failed");
                return Execution::Failed { action, reason: e.to_string() };
            }
        };

        let fill = match self.exchange.get_order(&self.instrument, &receipt.order_id).await {
            Ok(fill) => {
                info!(
                    order_id = %receipt.order_id,
                    state    = %fill.state,
                    filled   = fill.filled_size,
                    avg_px   = fill.average_px,
                    pnl      = ?fill.realized_pnl,
                    "✅ order filled"
                );
                Some(fill)
            }
            Err(e) => {
                warn!(order_id = %receipt.order_id, error = %e, "⚠️ order accepted but fill query failed");
                None
            }
        };

        Execution::Filled { action, receipt, fill }
    }
}
