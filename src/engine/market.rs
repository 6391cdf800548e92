//! # engine::market
//!
//! **Market Snapshot Provider** — pulls the last few candles for the
//! instrument and condenses them into a [`PriceObservation`].
//!
//! The exchange may return candles in any order (OKX sends newest first);
//! they are always sorted chronologically here before anything reads them.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use crate::exchange::{Exchange, ExchangeError};
use crate::models::{Candle, PriceObservation, Timeframe};

/// Bars requested per snapshot.
pub const CANDLE_LIMIT: usize = 10;
/// Bars kept on the observation for the prompt.
pub const TRAILING_BARS: usize = 5;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("exchange returned no candles")]
    NoCandles,

    #[error("unusable candle: {0}")]
    BadCandle(String),
}

pub struct MarketSnapshotProvider {
    exchange:   Arc<dyn Exchange>,
    instrument: String,
}

impl MarketSnapshotProvider {
    pub fn new(exchange: Arc<dyn Exchange>, instrument: impl Into<String>) -> Self {
        Self { exchange, instrument: instrument.into() }
    }

    pub async fn fetch(&self, timeframe: Timeframe) -> Result<PriceObservation, SnapshotError> {
        let candles = self
            .exchange
            .get_candles(&self.instrument, timeframe, CANDLE_LIMIT)
            .await?;

        debug!(count = candles.len(), %timeframe, "candles fetched");
        build_observation(candles, timeframe)
    }
}

/// Sorts, validates and summarises raw candles.
pub fn build_observation(
    mut candles: Vec<Candle>,
    timeframe: Timeframe,
) -> Result<PriceObservation, SnapshotError> {
    if candles.is_empty() {
        return Err(SnapshotError::NoCandles);
    }
    if let Some(bad) = candles.iter().find(|c| !usable(c)) {
        return Err(SnapshotError::BadCandle(format!(
            "{} o={} c={}",
            bad.open_time, bad.open, bad.close
        )));
    }

    candles.sort_by_key(|c| c.open_time);

    let current = candles[candles.len() - 1];
    // With a single bar the "previous" bar is the current one: 0 % change.
    let previous = if candles.len() >= 2 { candles[candles.len() - 2] } else { current };
    let change_pct = (current.close - previous.close) / previous.close * 100.0;

    let skip = candles.len().saturating_sub(TRAILING_BARS);
    let last_n_bars = candles[skip..].to_vec();

    Ok(PriceObservation {
        price: current.close,
        timestamp: Utc::now(),
        high: current.high,
        low: current.low,
        volume: current.volume,
        timeframe,
        change_pct,
        last_n_bars,
    })
}

fn usable(c: &Candle) -> bool {
    [c.open, c.high, c.low, c.close, c.volume].iter().all(|v| v.is_finite())
        && c.open > 0.0
        && c.close > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::testing::{candles, ScriptedExchange};

    #[test]
    fn test_single_bar_has_zero_change() {
        let obs = build_observation(candles(&[100.0]), Timeframe::M15).unwrap();
        assert_eq!(obs.price, 100.0);
        assert_eq!(obs.change_pct, 0.0);
        assert_eq!(obs.last_n_bars.len(), 1);
    }

    #[test]
    fn test_change_against_previous_close() {
        let obs = build_observation(candles(&[100.0, 200.0, 210.0]), Timeframe::M15).unwrap();
        assert_eq!(obs.price, 210.0);
        assert!((obs.change_pct - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_reverse_order_is_sorted() {
        let mut bars = candles(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 106.0]);
        bars.reverse();
        let obs = build_observation(bars, Timeframe::H1).unwrap();

        assert_eq!(obs.price, 106.0);
        assert_eq!(obs.last_n_bars.len(), TRAILING_BARS);
        let closes: Vec<f64> = obs.last_n_bars.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![102.0, 103.0, 104.0, 105.0, 106.0]);
        assert!(obs.last_n_bars.windows(2).all(|w| w[0].open_time < w[1].open_time));
    }

    #[test]
    fn test_empty_is_unavailable() {
        let result = build_observation(Vec::new(), Timeframe::M15);
        assert!(matches!(result, Err(SnapshotError::NoCandles)));
    }

    #[test]
    fn test_zero_close_is_unavailable() {
        let result = build_observation(candles(&[100.0, 0.0]), Timeframe::M15);
        assert!(matches!(result, Err(SnapshotError::BadCandle(_))));
    }

    #[tokio::test]
    async fn test_exchange_failure_is_unavailable() {
        let exchange = Arc::new(ScriptedExchange::new().with_candles(None));
        let provider = MarketSnapshotProvider::new(exchange, "BTC-USDT-SWAP");
        assert!(matches!(
            provider.fetch(Timeframe::M15).await,
            Err(SnapshotError::Exchange(_))
        ));
    }
}
