//! # brain — Signal Generator
//!
//! Snapshot + position + trailing histories → prompt → inference → parsed
//! [`TradeSignal`]. The generator owns no history; the supervisor passes the
//! windows in and records the result.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{BoundedHistory, OracleReading, PriceObservation, TradeSignal};

pub mod ai;
pub mod parse;
pub mod prompt;

#[cfg(test)]
pub mod testing;

pub use ai::{ChatClient, Inference};

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("inference failed: {0:#}")]
    Inference(anyhow::Error),

    #[error("reply contains no JSON object")]
    MissingJson,

    #[error("reply does not match the signal schema: {0}")]
    Schema(serde_json::Error),

    #[error("unknown direction '{0}'")]
    UnknownDirection(String),

    #[error("unknown confidence '{0}'")]
    UnknownConfidence(String),
}

pub struct SignalGenerator {
    inference:  Arc<dyn Inference>,
    instrument: String,
}

impl SignalGenerator {
    pub fn new(inference: Arc<dyn Inference>, instrument: impl Into<String>) -> Self {
        Self { inference, instrument: instrument.into() }
    }

    /// `price_history` is expected to already contain `observation`.
    pub async fn generate(
        &self,
        observation: &PriceObservation,
        reading: &OracleReading,
        price_history: &BoundedHistory<PriceObservation>,
        signal_history: &BoundedHistory<TradeSignal>,
    ) -> Result<TradeSignal, SignalError> {
        let system = prompt::system_prompt(&self.instrument, observation.timeframe);
        let user = prompt::build_prompt(
            &self.instrument,
            observation,
            reading,
            price_history,
            signal_history.last(),
        );

        debug!(chars = user.len(), "🧠 requesting signal");

        let reply = self
            .inference
            .complete(&system, &user)
            .await
            .map_err(SignalError::Inference)?;

        let signal = parse_reply(&reply, observation.timestamp)?;

        info!(
            direction  = signal.direction.as_str(),
            confidence = signal.confidence.as_str(),
            sl         = signal.stop_loss,
            tp         = signal.take_profit,
            "🧠 signal generated"
        );
        Ok(signal)
    }
}

fn parse_reply(reply: &str, timestamp: DateTime<Utc>) -> Result<TradeSignal, SignalError> {
    parse::parse_signal(reply, timestamp).inspect_err(|e| {
        warn!(error = %e, reply = %truncate(reply, 300), "⚠️ unusable model reply");
    })
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
