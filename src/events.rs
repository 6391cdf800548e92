//! # events
//!
//! Defines [`WsEvent`] — every event broadcast to WebSocket observers.
//!
//! Sent over `tokio::sync::broadcast::Sender<String>` as pre-serialized JSON
//! so the channel carries no `Clone` bound on domain types. No event ever
//! carries a raw error.

use serde::Serialize;

use crate::engine::ledger::ClosedTrade;
use crate::engine::reconciler::OrderAction;
use crate::models::TradeSignal;
use crate::state::StatusSnapshot;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsEvent {
    /// A cycle ran to the end; carries the newly published snapshot.
    CycleCompleted {
        snapshot: Box<StatusSnapshot>,
    },

    SignalGenerated {
        signal: Box<TradeSignal>,
    },

    /// Exchange accepted the order.
    OrderFilled {
        action:      OrderAction,
        order_id:    String,
        filled_size: Option<f64>,
        average_px:  Option<f64>,
    },

    /// Exchange refused the order, or it could not be submitted.
    OrderRejected {
        action: OrderAction,
        reason: String,
    },

    /// Test mode: the action that would have been sent.
    TradeSimulated {
        action: OrderAction,
    },

    /// A close was counted by the ledger.
    PositionClosed {
        trade:        ClosedTrade,
        total_trades: u64,
        win_rate:     Option<f64>,
    },

    BotPaused,

    BotResumed,
}

impl WsEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::OrderSide;
    use serde_json::Value;

    #[test]
    fn test_tagged_shape() {
        let event = WsEvent::TradeSimulated {
            action: OrderAction::Open { side: OrderSide::Buy, size: 0.01 },
        };
        let value: Value = serde_json::from_str(&event.to_json()).unwrap();

        assert_eq!(value["event"], "TRADE_SIMULATED");
        assert_eq!(value["action"]["kind"], "open");
        assert_eq!(value["action"]["side"], "buy");
    }

    #[test]
    fn test_unit_variant() {
        assert_eq!(WsEvent::BotPaused.to_json(), r#"{"event":"BOT_PAUSED"}"#);
    }
}
