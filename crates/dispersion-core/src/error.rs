//! Simulation error taxonomy.
//!
//! Per-day data problems are recoverable (the loop skips the day and
//! records a gap); configuration problems are fatal before the run
//! starts. A run that exhausts its data early is not an error at all,
//! it is reported as a partial result.

use chrono::NaiveDate;

/// Errors surfaced by the simulation core.
#[derive(Debug, Clone, serde::Serialize, thiserror::Error)]
pub enum SimError {
    /// An instrument has no quote in the day's observation.
    #[error("no market data for {symbol} on {date}")]
    DataMissing { date: NaiveDate, symbol: String },
    /// The provider has no observation at all for the date.
    #[error("no observation available for {0}")]
    DataUnavailable(NaiveDate),
    /// Proxy straddle vega is zero or unusable; no hedge can be sized.
    #[error("proxy straddle {symbol} has zero or missing vega on {date}")]
    ZeroVegaHedge { date: NaiveDate, symbol: String },
    /// Configuration rejected at initialization.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}
