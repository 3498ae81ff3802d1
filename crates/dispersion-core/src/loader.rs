//! # Market Data CSV Loader
//!
//! Maps loosely-typed feed/spreadsheet rows into the strict
//! [`DailyObservation`] schema at the data boundary. Every field is
//! validated explicitly; a malformed or absent value fails the load
//! with the offending line number instead of being silently defaulted.
//!
//! Expected layout (header required):
//!
//! `date,symbol,price,vega,delta,days_to_expiry`

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;

use crate::observation::{DailyObservation, InstrumentQuote, PrefetchedMarketData};

const EXPECTED_HEADER: &str = "date,symbol,price,vega,delta,days_to_expiry";

/// Load and validate a market data CSV file.
pub fn load_market_csv(path: &Path) -> Result<PrefetchedMarketData> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading market data from {}", path.display()))?;
    parse_market_csv(&contents)
        .with_context(|| format!("parsing market data from {}", path.display()))
}

/// Parse CSV contents into prefetched observations, grouped by date.
pub fn parse_market_csv(contents: &str) -> Result<PrefetchedMarketData> {
    let mut lines = contents.lines().enumerate();

    match lines.next() {
        Some((_, header)) if header.trim() == EXPECTED_HEADER => {}
        Some((_, header)) => bail!(
            "unexpected header {:?}, expected {:?}",
            header.trim(),
            EXPECTED_HEADER
        ),
        None => bail!("market data file is empty"),
    }

    let mut days: BTreeMap<NaiveDate, DailyObservation> = BTreeMap::new();
    for (idx, line) in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = idx + 1;

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 6 {
            bail!("line {line_no}: expected 6 fields, got {}", fields.len());
        }

        let date = NaiveDate::parse_from_str(fields[0], "%Y-%m-%d")
            .with_context(|| format!("line {line_no}: bad date {:?}", fields[0]))?;
        let symbol = fields[1];
        if symbol.is_empty() {
            bail!("line {line_no}: empty symbol");
        }
        let price = parse_field(fields[2], "price", line_no)?;
        let vega = parse_field(fields[3], "vega", line_no)?;
        let delta = parse_field(fields[4], "delta", line_no)?;
        let days_to_expiry: i64 = fields[5]
            .parse()
            .with_context(|| format!("line {line_no}: bad days_to_expiry {:?}", fields[5]))?;
        if price < 0.0 {
            bail!("line {line_no}: negative price {price} for {symbol}");
        }

        days.entry(date)
            .or_insert_with(|| DailyObservation::new(date))
            .insert(
                symbol,
                InstrumentQuote {
                    price,
                    vega,
                    delta,
                    days_to_expiry,
                },
            );
    }

    if days.is_empty() {
        bail!("market data file has a header but no rows");
    }

    Ok(PrefetchedMarketData::from_observations(
        days.into_values().collect(),
    ))
}

fn parse_field(raw: &str, name: &str, line_no: usize) -> Result<f64> {
    let value: f64 = raw
        .parse()
        .with_context(|| format!("line {line_no}: bad {name} {raw:?}"))?;
    if !value.is_finite() {
        bail!("line {line_no}: non-finite {name} {raw:?}");
    }
    Ok(value)
}
