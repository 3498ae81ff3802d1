//! # Straddle Instruments
//!
//! Definitions for the instruments the book trades: a straddle is a
//! call+put pair at the same strike and expiry on one underlying, and
//! is treated as a single tradable unit here. Greeks for the combined
//! unit arrive precomputed in the daily observations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Side of a leg relative to the straddle unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Exposure multiplier: +1 long, -1 short.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// Lowercase label used in the positions log (`long` / `short`).
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

/// Function a leg serves inside the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegRole {
    /// The single long index straddle, fixed after setup.
    Index,
    /// A short single-name straddle, fixed after setup.
    SingleName,
    /// The proxy straddle owned and resized by the hedge engine.
    HedgeProxy,
}

/// A call+put pair at one strike/expiry on one underlying.
///
/// Immutable once created; observations are keyed by `underlying`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Straddle {
    pub underlying: String,
    pub expiry: NaiveDate,
    pub strike: f64,
}

impl Straddle {
    pub fn new(underlying: impl Into<String>, expiry: NaiveDate, strike: f64) -> Self {
        Self {
            underlying: underlying.into(),
            expiry,
            strike,
        }
    }

    /// Derived ticker for display and the positions log,
    /// e.g. `AAPL190STRD`.
    pub fn ticker(&self) -> String {
        format!("{}{}STRD", self.underlying, self.strike.round() as i64)
    }
}
