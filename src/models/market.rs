//! # models::market
//!
//! Defines [`Candle`] (one OHLCV row as the exchange reports it) and
//! [`PriceObservation`] — the normalized view of the market that the
//! supervisor builds once per cycle and hands to the brain.
//!
//! A `PriceObservation` is never mutated after the snapshot provider returns
//! it; the trailing price window keeps clones of the most recent 20.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Timeframe ────────────────────────────────────────────────────────────────

/// Candle width the bot trades on. Only the four periods the dashboard
/// editor offers are recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Timeframe {
    #[default]
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// Config-file spelling (`"15m"`, `"1h"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H1  => "1h",
            Timeframe::H4  => "4h",
            Timeframe::D1  => "1d",
        }
    }

    /// OKX `bar` query parameter.
    pub fn okx_bar(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H1  => "1H",
            Timeframe::H4  => "4H",
            Timeframe::D1  => "1D",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "15m" => Ok(Timeframe::M15),
            "1h"  => Ok(Timeframe::H1),
            "4h"  => Ok(Timeframe::H4),
            "1d"  => Ok(Timeframe::D1),
            other => Err(format!("unknown timeframe '{other}'")),
        }
    }
}

// ─── Candle ───────────────────────────────────────────────────────────────────

/// One OHLCV bar. `open_time` is the bar's opening instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open:      f64,
    pub high:      f64,
    pub low:       f64,
    pub close:     f64,
    pub volume:    f64,
}

impl Candle {
    #[inline]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Body move of this bar in percent of its open.
    #[inline]
    pub fn body_change_pct(&self) -> f64 {
        (self.close - self.open) / self.open * 100.0
    }
}

// ─── PriceObservation ─────────────────────────────────────────────────────────

/// Normalized snapshot of the instrument at the time of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    /// Close of the most recent bar.
    pub price:          f64,
    /// Wall-clock instant the observation was taken.
    pub timestamp:      DateTime<Utc>,
    pub high:           f64,
    pub low:            f64,
    pub volume:         f64,
    pub timeframe:      Timeframe,
    /// `(close_t - close_{t-1}) / close_{t-1} * 100`; 0 when only one bar exists.
    pub change_pct:     f64,
    /// Trailing bars in chronological order, most recent last.
    pub last_n_bars:    Vec<Candle>,
}
