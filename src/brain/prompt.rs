//! # brain::prompt — builds the prompts sent to the model
//!
//! The user prompt carries everything the model may use: the trailing bars,
//! a 5-period SMA of observed prices, the previous call and the current
//! position. The reply format is pinned to one JSON object.

use crate::models::{BoundedHistory, OracleReading, PriceObservation, Timeframe, TradeSignal};

/// Observed prices averaged for the SMA line.
pub const SMA_PERIOD: usize = 5;

pub fn system_prompt(instrument: &str, timeframe: Timeframe) -> String {
    format!(
        "You are a disciplined derivatives trader analysing {instrument} on the {timeframe} timeframe. \
         Base every call on candle structure and the indicators provided. \
         Always answer with exactly one JSON object."
    )
}

/// Simple moving average of the last [`SMA_PERIOD`] observed prices, once
/// that many exist.
pub fn sma(price_history: &BoundedHistory<PriceObservation>) -> Option<f64> {
    if price_history.len() < SMA_PERIOD {
        return None;
    }
    let sum: f64 = price_history.tail(SMA_PERIOD).map(|o| o.price).sum();
    Some(sum / SMA_PERIOD as f64)
}

pub fn build_prompt(
    instrument: &str,
    observation: &PriceObservation,
    reading: &OracleReading,
    price_history: &BoundedHistory<PriceObservation>,
    last_signal: Option<&TradeSignal>,
) -> String {
    let timeframe = observation.timeframe;

    let mut bars = format!("## Last {} {timeframe} candles\n", observation.last_n_bars.len());
    for (i, bar) in observation.last_n_bars.iter().enumerate() {
        let kind = if bar.is_bullish() { "bullish" } else { "bearish" };
        bars.push_str(&format!(
            "- Bar {}: {kind} open {:.2} close {:.2} move {:+.2}%\n",
            i + 1,
            bar.open,
            bar.close,
            bar.body_change_pct(),
        ));
    }

    let indicators = match sma(price_history) {
        Some(sma) => format!(
            "## Indicators\n- SMA{SMA_PERIOD}: {sma:.2}\n- Price vs SMA{SMA_PERIOD}: {:+.2}%",
            (observation.price - sma) / sma * 100.0
        ),
        None => "## Indicators\n- Not enough observations yet".to_string(),
    };

    let previous = last_signal
        .map(|s| {
            format!(
                "\n## Previous signal\n- Direction: {}\n- Confidence: {}\n",
                s.direction.as_str(),
                s.confidence.as_str()
            )
        })
        .unwrap_or_default();

    format!(
        r#"Analyse {instrument} on the {timeframe} timeframe.

{bars}
{indicators}
{previous}
## Current market
- Price: {price:.2}
- Time: {time}
- Bar high: {high:.2}
- Bar low: {low:.2}
- Bar volume: {volume:.2}
- Change vs previous bar: {change:+.2}%
- Current position: {position}

## Your task
1. Give a signal for the {timeframe} trend: BUY, SELL or HOLD
2. Explain briefly (trend continuity, support/resistance, volume)
3. Suggest a stop-loss price
4. Suggest a take-profit price
5. Rate your confidence

Reply in this JSON format:
{{
  "direction": "BUY|SELL|HOLD",
  "rationale": "<reasoning>",
  "stop_loss": <price>,
  "take_profit": <price>,
  "confidence": "HIGH|MEDIUM|LOW"
}}"#,
        price    = observation.price,
        time     = observation.timestamp.to_rfc3339(),
        high     = observation.high,
        low      = observation.low,
        volume   = observation.volume,
        change   = observation.change_pct,
        position = reading.summary(),
    )
}
