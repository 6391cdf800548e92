//! # brain::parse — model reply → [`TradeSignal`]
//!
//! Two steps, neither weakened:
//! 1. take the span from the first `{` to the last `}` (prose around it is fine)
//! 2. deserialize that span strictly; all five fields must be present

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use super::SignalError;
use crate::models::{Confidence, Direction, TradeSignal};

/// Reply schema. `signal`/`reason` are the older field names.
#[derive(Debug, Deserialize)]
struct SignalReply {
    #[serde(alias = "signal")]
    direction:   String,
    #[serde(alias = "reason")]
    rationale:   String,
    #[serde(deserialize_with = "price")]
    stop_loss:   f64,
    #[serde(deserialize_with = "price")]
    take_profit: f64,
    confidence:  String,
}

/// Price levels arrive as numbers or, from some models, numeric strings.
fn price<'de, D: Deserializer<'de>>(de: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Level {
        Number(f64),
        Text(String),
    }

    match Level::deserialize(de)? {
        Level::Number(n) => Ok(n),
        Level::Text(s) => s
            .trim()
            .trim_start_matches('$')
            .replace(',', "")
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("price level '{s}' is not a number"))),
    }
}

/// Outermost brace span, or `None` when the reply has no `{ ... }`.
pub fn extract_json_span(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

pub fn parse_signal(reply: &str, timestamp: DateTime<Utc>) -> Result<TradeSignal, SignalError> {
    let span = extract_json_span(reply).ok_or(SignalError::MissingJson)?;
    let parsed: SignalReply = serde_json::from_str(span).map_err(SignalError::Schema)?;

    let direction = match parsed.direction.trim().to_uppercase().as_str() {
        "BUY"  => Direction::Buy,
        "SELL" => Direction::Sell,
        "HOLD" => Direction::Hold,
        _ => return Err(SignalError::UnknownDirection(parsed.direction)),
    };

    let confidence = match parsed.confidence.trim().to_uppercase().as_str() {
        "HIGH"   => Confidence::High,
        "MEDIUM" => Confidence::Medium,
        "LOW"    => Confidence::Low,
        _ => return Err(SignalError::UnknownConfidence(parsed.confidence)),
    };

    Ok(TradeSignal {
        direction,
        rationale: parsed.rationale,
        stop_loss: parsed.stop_loss,
        take_profit: parsed.take_profit,
        confidence,
        timestamp,
    })
}
