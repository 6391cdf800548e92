//! # models::position
//!
//! What the exchange says the account holds right now.
//!
//! `PositionState` is always read fresh from the exchange — margin and
//! liquidation fields must reflect the latest exchange-reported truth, so
//! nothing in the crate caches one across cycles.

use serde::{Deserialize, Serialize};

// ─── Side ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Flat,
    Long,
    Short,
}

impl Side {
    /// Side implied by a signed position quantity (positive = long).
    pub fn from_quantity(qty: f64) -> Self {
        if qty > 0.0 {
            Side::Long
        } else if qty < 0.0 {
            Side::Short
        } else {
            Side::Flat
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Flat  => write!(f, "flat"),
            Side::Long  => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

// ─── AccountBalance ───────────────────────────────────────────────────────────

/// Settlement-currency balance figures after fallback resolution.
/// Zero is a legitimate value for both fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub free_balance:  f64,
    pub total_balance: f64,
}

// ─── PositionState ────────────────────────────────────────────────────────────

/// An open position with full margin detail.
///
/// Invariant: `side == Flat` iff `size == 0`, and `side` agrees with the sign
/// of the raw signed quantity. Construct through [`PositionState::new`] to
/// keep that true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    pub side:                     Side,
    /// Absolute contract count.
    pub size:                     f64,
    pub entry_price:              f64,
    pub mark_price:               f64,
    pub unrealized_pnl:           f64,
    pub leverage:                 f64,
    pub initial_margin:           f64,
    pub maintenance_margin:       f64,
    /// Percent.
    pub maintenance_margin_ratio: f64,
    pub liquidation_price:        f64,
    pub free_balance:             f64,
    pub total_balance:            f64,
}

impl PositionState {
    /// Builds a state whose side and size both derive from one signed
    /// quantity. Remaining fields start at zero.
    pub fn new(signed_qty: f64) -> Self {
        Self {
            side:                     Side::from_quantity(signed_qty),
            size:                     signed_qty.abs(),
            entry_price:              0.0,
            mark_price:               0.0,
            unrealized_pnl:           0.0,
            leverage:                 0.0,
            initial_margin:           0.0,
            maintenance_margin:       0.0,
            maintenance_margin_ratio: 0.0,
            liquidation_price:        0.0,
            free_balance:             0.0,
            total_balance:            0.0,
        }
    }

    pub fn balance(&self) -> AccountBalance {
        AccountBalance {
            free_balance:  self.free_balance,
            total_balance: self.total_balance,
        }
    }
}

// ─── OracleReading ────────────────────────────────────────────────────────────

/// Successful outcome of one Position Oracle read. A failed read is an
/// error, never an `AccountInfoOnly`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OracleReading {
    Open(PositionState),
    AccountInfoOnly(AccountBalance),
}

impl OracleReading {
    pub fn side(&self) -> Side {
        match self {
            OracleReading::Open(p) => p.side,
            OracleReading::AccountInfoOnly(_) => Side::Flat,
        }
    }

    pub fn size(&self) -> f64 {
        match self {
            OracleReading::Open(p) => p.size,
            OracleReading::AccountInfoOnly(_) => 0.0,
        }
    }

    pub fn position(&self) -> Option<&PositionState> {
        match self {
            OracleReading::Open(p) => Some(p),
            OracleReading::AccountInfoOnly(_) => None,
        }
    }

    pub fn balance(&self) -> AccountBalance {
        match self {
            OracleReading::Open(p) => p.balance(),
            OracleReading::AccountInfoOnly(b) => *b,
        }
    }

    /// Total balance with open-position PnL taken out. Equal to the total
    /// balance when flat.
    pub fn realized_balance(&self) -> f64 {
        match self {
            OracleReading::Open(p) => p.total_balance - p.unrealized_pnl,
            OracleReading::AccountInfoOnly(b) => b.total_balance,
        }
    }

    /// One-line summary used in the prompt and in logs.
    pub fn summary(&self) -> String {
        match self {
            OracleReading::Open(p) => format!(
                "{} position, size: {}, unrealized PnL: {:.2} USDT",
                p.side, p.size, p.unrealized_pnl
            ),
            OracleReading::AccountInfoOnly(_) => "no position".to_string(),
        }
    }
}
