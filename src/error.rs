//! # error
//!
//! Centralised error types.
//!
//! - [`AppError`] — fallible HTTP handlers return `Result<_, AppError>`;
//!   Axum's `IntoResponse` impl turns it into a structured JSON body.
//! - [`CycleError`] — which stage aborted a reconciliation cycle. Always
//!   recoverable: the supervisor logs it, backs off and starts over.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::brain::SignalError;
use crate::engine::market::SnapshotError;
use crate::exchange::ExchangeError;

// ─── AppError ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AppError {
    /// Nothing has been published yet.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}

// ─── CycleError ───────────────────────────────────────────────────────────────

/// Stage at which a cycle gave up. Transient I/O and parse failures are
/// treated the same way.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("market snapshot unavailable: {0}")]
    MarketUnavailable(#[from] SnapshotError),

    #[error("position unavailable ({stage} read): {source}")]
    PositionUnavailable {
        stage:  &'static str,
        #[source]
        source: ExchangeError,
    },

    #[error("signal unavailable: {0}")]
    SignalUnavailable(#[from] SignalError),
}

impl CycleError {
    /// Short stage label for logs and metrics fields.
    pub fn stage(&self) -> &'static str {
        match self {
            CycleError::MarketUnavailable(_) => "market",
            CycleError::PositionUnavailable { stage, .. } => stage,
            CycleError::SignalUnavailable(_) => "signal",
        }
    }
}
