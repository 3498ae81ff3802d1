//! # Daily Market Observations
//!
//! One [`DailyObservation`] holds the per-instrument price and greeks
//! snapshot for a single trading date. Observations are produced at the
//! data boundary (feed, spreadsheet, CSV) and consumed read-only by the
//! simulation; a missing quote is an explicit [`SimError::DataMissing`],
//! never a silent default.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::SimError;

/// Price and greeks for one straddle on one date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InstrumentQuote {
    /// Straddle unit price.
    pub price: f64,
    /// Per-unit vega.
    pub vega: f64,
    /// Per-unit delta.
    pub delta: f64,
    /// Calendar days until the straddle's expiry.
    pub days_to_expiry: i64,
}

/// Immutable per-date snapshot of all instrument quotes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyObservation {
    pub date: NaiveDate,
    quotes: HashMap<String, InstrumentQuote>,
}

impl DailyObservation {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            quotes: HashMap::new(),
        }
    }

    pub fn insert(&mut self, symbol: impl Into<String>, quote: InstrumentQuote) {
        self.quotes.insert(symbol.into(), quote);
    }

    /// Quote lookup that fails loudly when the instrument is absent.
    pub fn quote(&self, symbol: &str) -> Result<&InstrumentQuote, SimError> {
        self.quotes.get(symbol).ok_or_else(|| SimError::DataMissing {
            date: self.date,
            symbol: symbol.to_string(),
        })
    }

    pub fn get(&self, symbol: &str) -> Option<&InstrumentQuote> {
        self.quotes.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

/// Source of daily observations.
///
/// The simulation treats this as a pure lookup; retry and caching
/// policy belong to the implementation behind it.
pub trait MarketDataProvider {
    /// Observation for a date, or [`SimError::DataUnavailable`].
    fn get_observation(&self, date: NaiveDate) -> Result<DailyObservation, SimError>;

    /// First date the provider has any data for. Lets the simulation
    /// skip straight to inception instead of probing empty days.
    fn first_available(&self) -> Option<NaiveDate>;

    /// Last date the provider has any data for. Drives partial-run
    /// detection when the configured range outlives the data.
    fn last_available(&self) -> Option<NaiveDate>;
}

/// In-memory provider over data prefetched for the whole date range.
///
/// Decouples the sequential simulation loop from variable-latency
/// external fetches: everything is loaded up front, then replayed.
#[derive(Debug, Clone, Default)]
pub struct PrefetchedMarketData {
    days: BTreeMap<NaiveDate, DailyObservation>,
}

impl PrefetchedMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one day's observation, replacing any prior snapshot for
    /// the same date.
    pub fn insert(&mut self, obs: DailyObservation) {
        self.days.insert(obs.date, obs);
    }

    pub fn from_observations(observations: Vec<DailyObservation>) -> Self {
        let mut data = Self::new();
        for obs in observations {
            data.insert(obs);
        }
        data
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

impl MarketDataProvider for PrefetchedMarketData {
    fn get_observation(&self, date: NaiveDate) -> Result<DailyObservation, SimError> {
        self.days
            .get(&date)
            .cloned()
            .ok_or(SimError::DataUnavailable(date))
    }

    fn first_available(&self) -> Option<NaiveDate> {
        self.days.keys().next().copied()
    }

    fn last_available(&self) -> Option<NaiveDate> {
        self.days.keys().next_back().copied()
    }
}
