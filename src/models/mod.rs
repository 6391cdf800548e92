//! Domain models shared across the whole reconciliation loop.

pub mod history;
pub mod ledger;
pub mod market;
pub mod position;
pub mod signal;

pub use history::BoundedHistory;
pub use ledger::{EquityPoint, TradeStats};
pub use market::{Candle, PriceObservation, Timeframe};
pub use position::{AccountBalance, OracleReading, PositionState, Side};
pub use signal::{Confidence, Direction, TradeSignal};
