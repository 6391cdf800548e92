//! # models::signal
//!
//! Defines [`TradeSignal`] — the brain's recommendation for one cycle.
//! Produced once, appended to the bounded signal history, never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Direction ────────────────────────────────────────────────────────────────

/// The AI's directional call for the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Buy,
    Sell,
    /// No edge — keep whatever is open, open nothing.
    Hold,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy  => "BUY",
            Direction::Sell => "SELL",
            Direction::Hold => "HOLD",
        }
    }
}

// ─── Confidence ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High   => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low    => "LOW",
        }
    }
}

// ─── TradeSignal ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub direction:   Direction,
    pub rationale:   String,
    pub stop_loss:   f64,
    pub take_profit: f64,
    pub confidence:  Confidence,
    pub timestamp:   DateTime<Utc>,
}
